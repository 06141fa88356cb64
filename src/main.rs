use std::io::Write as _;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use exa_direct::ExaError;
use exa_direct::api::ExaClient;
use exa_direct::cli::{AnswerArgs, Cli, Command, ContextCommand, ResearchCommand};
use exa_direct::config::ClientConfig;
use exa_direct::output::{save_json, write_json};
use exa_direct::research::ResearchApi as _;
use serde_json::{Value, json};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let kind = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<ExaError>())
            .map_or("error", ExaError::kind);
        eprintln!("error[{kind}]: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    exa_direct::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "parsed cli");

    let config = ClientConfig::from_env(cli.api_key.clone())?;
    let client = ExaClient::from_config(&config).context("init client")?;

    let Some(result) = dispatch(&client, &cli.command)? else {
        return Ok(());
    };

    if let Some(path) = &cli.save {
        save_json(path, &result, cli.pretty)
            .with_context(|| format!("save result to {}", path.display()))?;
    }
    write_json(&mut std::io::stdout().lock(), &result, cli.pretty).context("write result")?;
    Ok(())
}

/// Runs one command. Streaming commands print as they go and return `None`.
fn dispatch(client: &ExaClient, command: &Command) -> anyhow::Result<Option<Value>> {
    let result = match command {
        Command::Search(args) => client.search(&args.to_request()?).context("search")?,
        Command::Contents(args) => client.contents(&args.to_request()?).context("contents")?,
        Command::FindSimilar(args) => client
            .find_similar(&args.to_request()?)
            .context("find similar")?,
        Command::Answer(args) if args.stream => {
            stream_answer(client, args)?;
            return Ok(None);
        }
        Command::Answer(args) => client.answer(&args.to_request()?).context("answer")?,
        Command::Research(research) => return run_research(client, research),
        Command::Context(ContextCommand::Query(args)) => client
            .context(&args.to_request())
            .context("context query")?,
    };
    Ok(Some(result))
}

fn run_research(client: &ExaClient, command: &ResearchCommand) -> anyhow::Result<Option<Value>> {
    let research = client.research();
    let value = match command {
        ResearchCommand::Start(args) => {
            let request = args.to_request()?;
            let task = research.create(&request).context("research start")?;
            tracing::info!(id = %task.id, status = %task.status, "research task created");
            serde_json::to_value(task)?
        }
        ResearchCommand::Get(args) => {
            serde_json::to_value(research.get(&args.id, args.events).context("research get")?)?
        }
        ResearchCommand::List(args) => serde_json::to_value(
            research
                .list(args.cursor.as_deref(), args.limit)
                .context("research list")?,
        )?,
        ResearchCommand::Poll(args) => {
            let options = args.to_options();
            tracing::info!(
                id = %args.id,
                interval = ?options.interval,
                timeout = ?options.timeout,
                "polling research task"
            );
            let task = research
                .wait_until_finished(&args.id, options)
                .context("research poll")?;
            serde_json::to_value(task)?
        }
        ResearchCommand::Stream(args) => {
            let mut out = std::io::stdout().lock();
            for event in research.stream(&args.id)? {
                let event = event.context("research stream")?;
                write_json(&mut out, &event, false)?;
            }
            return Ok(None);
        }
    };
    Ok(Some(value))
}

fn stream_answer(client: &ExaClient, args: &AnswerArgs) -> anyhow::Result<()> {
    let request = args.to_request()?;
    let chunks = client.answer_stream(&request).context("answer stream")?;
    let mut out = std::io::stdout().lock();

    for chunk in chunks {
        let chunk = chunk.context("answer stream")?;
        if args.json_lines {
            if let Some(content) = &chunk.content {
                write_json(&mut out, &json!({ "event": "chunk", "data": content }), false)?;
            }
            if let Some(citations) = &chunk.citations {
                write_json(&mut out, &json!({ "event": "citations", "data": citations }), false)?;
            }
        } else if let Some(content) = &chunk.content {
            write!(out, "{content}")?;
            out.flush()?;
        }
    }

    if args.json_lines {
        write_json(&mut out, &json!({ "event": "done" }), false)?;
    } else {
        writeln!(out)?;
    }
    Ok(())
}
