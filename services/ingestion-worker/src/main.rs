use std::sync::Arc;

use anyhow::Result;
use registry_core::{init_tracing, load_config, EvaluationPipeline, InMemoryRepository, TracingAuditSink};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

mod fetcher;
mod handler;
mod http;
mod settings;

const SERVICE: &str = "ingestion-worker";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE)?;
    let cfg = load_config(SERVICE)?;
    let worker = settings::load(SERVICE)?;
    info!(hf = %worker.hf_api_base, github = %worker.github_api_base, retries = worker.retry_attempts, "worker settings loaded");

    let http = http::HttpClient::new(&worker)?;
    let pipeline = EvaluationPipeline::builder(cfg, Arc::new(fetcher::HubFetcher::new(http.clone(), &worker)), Arc::new(InMemoryRepository::new()))
        .audit_sink(Arc::new(TracingAuditSink))
        .license_resolver(Arc::new(fetcher::GithubLicenseResolver::new(http, &worker)))
        .build()?;
    let handler = handler::Handler::new(pipeline);
    info!("service ready, reading requests from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = tokio::select! {
            l = lines.next_line() => l?,
            _ = signal::ctrl_c() => { info!("interrupted"); break; }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() { continue; }
        let resp = handler.handle_line(&line).await;
        if !resp.ok { warn!(error = ?resp.error, "request failed"); }
        let mut out = serde_json::to_vec(&resp)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    info!("shutdown");
    Ok(())
}
