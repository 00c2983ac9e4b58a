pub mod clear;
pub mod config;
pub mod index;
pub mod reindex;
pub mod search;
pub mod status;

use tokio_util::sync::CancellationToken;

/// Token that trips on Ctrl-C so in-flight batches can drain cleanly.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trip.cancel();
        }
    });
    token
}
