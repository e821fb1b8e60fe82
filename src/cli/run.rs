//! Run command handler.

use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::di::FromRef;
use crate::services::{ObservationWorker, ScrapeCoordinator};

use super::App;

impl App {
    /// Subscribes the worker, publishes active instructions and processes
    /// observations until Ctrl-C.
    pub async fn run_worker(&self, ctx: &Context, cancel: CancellationToken) -> Result<()> {
        let worker = ObservationWorker::from_ref(ctx);
        let subscription = worker.subscribe().await?;

        let published = ScrapeCoordinator::from_ref(ctx).publish_active().await?;
        tracing::info!(published, "waiting for observations, press Ctrl-C to stop");

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for Ctrl-C");
            }
            shutdown.cancel();
        });

        let stats = worker.process(subscription, cancel).await;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}
