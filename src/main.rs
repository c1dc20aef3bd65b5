//! Application entry point

use agent_stats::stats::{format_bytes, format_number_full};
use agent_stats::{provider_spec, Config, GlobalAggregate, StatsEngine, StatsProgress};
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use std::thread;

#[derive(Parser)]
#[command(name = "agent-stats")]
#[command(about = "Aggregate usage across local AI coding agent session logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Discard the stats cache and reparse every session
    #[arg(long)]
    rebuild: bool,

    /// Print the final aggregate as JSON
    #[arg(long)]
    json: bool,

    /// Do not report progress while scanning
    #[arg(long, short)]
    quiet: bool,
}

fn print_progress(progress: &StatsProgress) {
    let totals = &progress.snapshot.totals;
    eprintln!(
        "[{}/{}] {} sessions, {} messages",
        progress.processed,
        progress.total,
        format_number_full(totals.sessions),
        format_number_full(totals.messages)
    );
}

fn write_table(out: &mut impl Write, stats: &GlobalAggregate) -> io::Result<()> {
    writeln!(
        out,
        "{:<14} {:>9} {:>11} {:>15} {:>15} {:>11} {:>10}",
        "provider", "sessions", "messages", "tokens in", "tokens out", "cost", "size"
    )?;
    for (id, p) in &stats.by_provider {
        let name: &str = match provider_spec(id) {
            Some(spec) => spec.name,
            None => id,
        };
        let cost = if p.has_cost_data {
            format!("${:.2}", p.cost_usd)
        } else {
            "-".to_string()
        };
        writeln!(
            out,
            "{:<14} {:>9} {:>11} {:>15} {:>15} {:>11} {:>10}",
            name,
            format_number_full(p.session_count),
            format_number_full(p.message_count),
            format_number_full(p.tokens_in),
            format_number_full(p.tokens_out),
            cost,
            format_bytes(p.size_bytes)
        )?;
    }

    let t = &stats.totals;
    let cost = if stats.has_cost_data {
        format!("${:.2}", t.cost_usd)
    } else {
        "-".to_string()
    };
    writeln!(
        out,
        "{:<14} {:>9} {:>11} {:>15} {:>15} {:>11} {:>10}",
        "total",
        format_number_full(t.sessions),
        format_number_full(t.messages),
        format_number_full(t.tokens_in),
        format_number_full(t.tokens_out),
        cost,
        format_bytes(t.size_bytes)
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let engine = StatsEngine::new(Config::from_env());
    if cli.rebuild {
        if let Err(e) = engine.store().clear() {
            log::warn!("Failed to clear stats cache: {}", e);
        }
    }

    // Final snapshot is printed below, so the listener skips it
    let listener = (!cli.quiet).then(|| {
        let rx = engine.subscribe();
        thread::spawn(move || {
            for progress in rx.iter().filter(|p| !p.snapshot.is_complete) {
                print_progress(&progress);
            }
        })
    });

    let result = engine.compute_global_stats();
    // Closes the progress channel
    drop(engine);
    if let Some(handle) = listener {
        let _ = handle.join();
    }

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    let written = if cli.json {
        serde_json::to_writer_pretty(&mut stdout, &stats)
            .map_err(io::Error::from)
            .and_then(|_| writeln!(stdout))
    } else {
        write_table(&mut stdout, &stats)
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_stats::{ProviderAggregate, CLAUDE_CODE};

    #[test]
    fn test_table_lists_providers_and_total() {
        let mut stats = GlobalAggregate {
            has_cost_data: true,
            is_complete: true,
            ..Default::default()
        };
        stats.totals.sessions = 3;
        stats.totals.cost_usd = 1.5;
        stats.by_provider.insert(
            CLAUDE_CODE.to_string(),
            ProviderAggregate {
                session_count: 3,
                tokens_in: 12_345,
                cost_usd: 1.5,
                has_cost_data: true,
                ..Default::default()
            },
        );

        let mut out = Vec::new();
        write_table(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Claude Code"));
        assert!(lines[1].contains("12,345"));
        assert!(lines[2].starts_with("total"));
        assert!(lines[2].contains("$1.50"));
    }
}
