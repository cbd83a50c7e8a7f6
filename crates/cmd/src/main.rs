// Copyright 2025 svckit contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use snafu::{ResultExt, Whatever};
use svckit_app::{AppConfig, AppContext};
use svckit_common_telemetry as telemetry;
use svckit_queue::{DocumentCodec, ThreadSafeQueue};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "svckit",
about = "Inspect and manipulate svckit paging queues",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    /// TOML configuration file; `SVCKIT__*` environment variables override
    /// it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Stats(StatsArgs),
    Push(PushArgs),
    Drain(DrainArgs),
    Clear(ClearArgs),
}

/// Which queue to open.
#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Queue working directory. Defaults to `<data_dir>/<app_id>/<instance>/<name>`.
    #[arg(long)]
    dir:       Option<PathBuf>,
    /// Queue name.
    #[arg(long, default_value = "queue")]
    name:      String,
    /// Items per page file.
    #[arg(long)]
    page_size: Option<usize>,
}

impl QueueArgs {
    fn open(&self, context: &AppContext) -> Result<ThreadSafeQueue<DocumentCodec>, Whatever> {
        let mut queue_config = context.config().queue_config(&self.name);
        if let Some(dir) = &self.dir {
            queue_config.working_dir.clone_from(dir);
        }
        if let Some(page_size) = self.page_size {
            queue_config.max_items_per_page = page_size;
        }
        ThreadSafeQueue::open(queue_config, DocumentCodec::new())
            .with_whatever_context(|_| format!("Failed to open queue '{}'", self.name))
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the item and page-file count of a queue.
Examples:

svckit stats --dir ./data/jobs --name jobs
svckit stats --name jobs --prometheus

")]
struct StatsArgs {
    #[command(flatten)]
    queue:      QueueArgs,
    /// Print prometheus text exposition instead of JSON.
    #[arg(long)]
    prometheus: bool,
}

impl StatsArgs {
    fn run(&self, context: &AppContext) -> Result<(), Whatever> {
        let queue = std::sync::Arc::new(self.queue.open(context)?);
        context.stats().register_queue(&self.queue.name, queue.clone());
        let snapshot = context.stats().gather();

        if self.prometheus {
            let text = context
                .stats()
                .encode_text()
                .whatever_context("Failed to encode metrics")?;
            print!("{text}");
        } else {
            let stats = serde_json::json!({
                "queue": self.queue.name,
                "items": snapshot.get(&self.queue.name).copied().unwrap_or_default(),
                "pages": queue.page_files(),
            });
            println!("{stats}");
        }
        queue.shutdown().whatever_context("Failed to shut queue down")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r#"

Push a JSON document onto a queue.
Examples:

svckit push --name jobs '{"id": 1}'
svckit push --name jobs --count 1000 '{"load": "test"}'

"#)]
struct PushArgs {
    #[command(flatten)]
    queue:    QueueArgs,
    /// Document to push.
    document: String,
    /// Number of copies to push.
    #[arg(long, default_value_t = 1)]
    count:    usize,
}

impl PushArgs {
    fn run(&self, context: &AppContext) -> Result<(), Whatever> {
        let document: serde_json::Value =
            serde_json::from_str(&self.document).whatever_context("Document is not valid JSON")?;
        let queue = self.queue.open(context)?;
        for _ in 0..self.count {
            queue
                .push(document.clone())
                .whatever_context("Failed to push document")?;
        }
        println!("pushed {} item(s), queue size {}", self.count, queue.size());
        queue.shutdown().whatever_context("Failed to shut queue down")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Pop items and print them as JSON lines.
Examples:

svckit drain --name jobs
svckit drain --name jobs --limit 10

")]
struct DrainArgs {
    #[command(flatten)]
    queue: QueueArgs,
    /// Stop after this many items.
    #[arg(long)]
    limit: Option<usize>,
}

impl DrainArgs {
    fn run(&self, context: &AppContext) -> Result<(), Whatever> {
        let queue = self.queue.open(context)?;
        let limit = self.limit.unwrap_or(usize::MAX);
        let mut drained = 0;
        while drained < limit {
            let Some(item) = queue.pop().whatever_context("Failed to pop item")? else {
                break;
            };
            println!("{item}");
            drained += 1;
        }
        queue.shutdown().whatever_context("Failed to shut queue down")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Delete every item and page file of a queue.
Examples:

svckit clear --name jobs

")]
struct ClearArgs {
    #[command(flatten)]
    queue: QueueArgs,
}

impl ClearArgs {
    fn run(&self, context: &AppContext) -> Result<(), Whatever> {
        let queue = self.queue.open(context)?;
        queue.clear().whatever_context("Failed to clear queue")?;
        println!("cleared queue '{}'", self.queue.name);
        queue.shutdown().whatever_context("Failed to shut queue down")
    }
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).whatever_context("Failed to load configuration")?;
    // Keep stdout for command output unless asked otherwise.
    config.logging.level.get_or_insert_with(|| "warn".to_string());
    let _guards = telemetry::init_global_logging("svckit", &config.logging);
    telemetry::set_panic_hook();

    let context = AppContext::new(config).whatever_context("Failed to create application context")?;
    match cli.commands {
        Commands::Stats(args) => args.run(&context),
        Commands::Push(args) => args.run(&context),
        Commands::Drain(args) => args.run(&context),
        Commands::Clear(args) => args.run(&context),
    }
}
