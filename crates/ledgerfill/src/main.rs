mod cli;

use clap::Parser;
use eyre::{eyre, WrapErr};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use ledgerfill_core::range::cutoff_for_days;
use ledgerfill_core::rpc::{EthRpc, HttpRpcClient};
use ledgerfill_core::{plan_range, Backfill, Ledger, RangeSelector, TraceExtractor, TraceStrategy};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let rpc = HttpRpcClient::new(&args.rpc_url, args.rpc_options())
        .context("configure JSON-RPC client")?;

    // Fail fast with a readable message if the endpoint is unreachable.
    let tip = rpc.block_number().await.map_err(|err| {
        let message = format_rpc_connect_error(&args.rpc_url, &err.to_string());
        eyre!(message).wrap_err("while attempting to reach the JSON-RPC endpoint")
    })?;
    tracing::info!(tip, "connected to JSON-RPC endpoint");

    let now = OffsetDateTime::now_utc();
    let selector = args.range_selector();
    if let RangeSelector::Days { days, .. } = selector {
        let cutoff = cutoff_for_days(now.unix_timestamp().max(0) as u64, days);
        let cutoff_at = OffsetDateTime::from_unix_timestamp(cutoff as i64)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| cutoff.to_string());
        tracing::info!(days, cutoff = %cutoff_at, "resolving time window");
    }

    let Some(range) = selector
        .resolve(&rpc, tip, now.unix_timestamp().max(0) as u64)
        .await
        .context("resolve block range")?
    else {
        tracing::info!(category = "progress", "no blocks in the requested window; nothing to do");
        return Ok(());
    };

    let mut ledger = Ledger::open(&args.db)
        .with_context(|| format!("open ledger database {}", args.db.display()))?;
    tracing::info!(path = %args.db.display(), "ledger opened");

    let Some(range) = plan_range(&ledger, &args.stream_id, range, args.resume)
        .context("read checkpoint")?
    else {
        tracing::info!(category = "progress", stream_id = %args.stream_id, "range already synced; nothing to do");
        return Ok(());
    };

    let settings = args.trace_settings();
    let strategy = TraceStrategy::resolve(&rpc, &settings)
        .await
        .context("select trace strategy")?;
    tracing::info!(?strategy, "trace strategy selected");
    let traces = TraceExtractor::new(strategy, settings.call_delay);

    let mut backfill = Backfill::new(&rpc, &mut ledger, traces, args.backfill_config());
    tokio::select! {
        result = backfill.run(range) => {
            let report = result.context("backfill failed; checkpoint points before the failed batch")?;
            tracing::info!(
                category = "progress",
                batches = report.batches,
                blocks = report.blocks,
                new_txs = report.stats.transactions,
                new_internal = report.stats.internal_transfers,
                new_ledger_rows = report.stats.ledger_rows,
                "range fully synced"
            );
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for Ctrl-C")?;
            tracing::warn!(category = "failure", "interrupted; last committed checkpoint kept");
            Err(eyre!("interrupted before range {range} was fully synced"))
        }
    }
}

fn format_rpc_connect_error(rpc_url: &str, source_error: &str) -> String {
    let mut lines = vec![
        format!("could not reach JSON-RPC endpoint `{rpc_url}`"),
        format!("RPC error: {source_error}"),
    ];

    if source_error.contains("Could not resolve host") || source_error.contains("dns error") {
        lines.push(
            "hint: hostname resolution failed; verify the endpoint hostname and your DNS/network"
                .into(),
        );
    } else if source_error.contains("tls")
        || source_error.contains("certificate")
        || source_error.contains("SSL")
    {
        lines.push(
            "hint: TLS handshake failed; verify certificate trust and that the endpoint uses HTTPS"
                .into(),
        );
    } else if source_error.contains("401") || source_error.contains("403") {
        lines.push("hint: authentication failed; verify the API key in the endpoint URL".into());
    } else if source_error.contains("-32601") {
        lines.push("hint: the endpoint does not speak the Ethereum JSON-RPC API".into());
    } else if source_error.contains("error sending request for url") {
        lines.push("hint: request could not be sent; verify URL format, network access, and endpoint reachability".into());
    }

    lines.join("\n")
}
