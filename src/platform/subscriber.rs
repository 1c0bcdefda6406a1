use crate::domain::events::{LiveUpdate, ViewEvent};
use crate::domain::live_feed::LiveFeed;
use crate::domain::sample::TelemetrySample;
use crate::domain::session::Session;
use crate::domain::subscription::SubscriptionHandle;
use crate::platform::client::{PlatformClient, PlatformError};
use crate::platform::domain::{SubscriptionCommands, SubscriptionUpdate};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl LiveFeed for PlatformClient {
    #[instrument(skip(self, session, tx))]
    async fn subscribe(
        &self,
        session: &Session,
        device_id: &str,
        keys: &[String],
        channel: u64,
        tx: Sender<ViewEvent>,
    ) -> Result<SubscriptionHandle, PlatformError> {
        let platform = self.config.platform();
        // The token travels in the query string, only the base URL is logged
        let url = format!("{}/api/ws/plugins/telemetry?token={}", platform.ws_url(), session.token());
        let connect_timeout = platform.connect_timeout();
        let strategy = ExponentialBackoff::from_millis(platform.retry_ms())
            .factor(2)
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(platform.connect_retries());

        info!("📡 Connecting to push channel {}...", platform.ws_url());
        let (mut socket, _) = Retry::start(strategy, || async {
            timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| PlatformError::ConnectTimeout(connect_timeout))?
                .map_err(PlatformError::from)
                .inspect_err(|e| warn!("⚠️ Push channel connect failed: {}", e))
        })
        .await?;

        let cmd_id = self.next_cmd_id();
        let commands = SubscriptionCommands::latest_telemetry(device_id, cmd_id, keys);
        socket.send(Message::text(serde_json::to_string(&commands)?)).await?;
        info!(cmd_id, "📡 Connecting to push channel {}... OK", platform.ws_url());

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(pump(socket, keys.to_vec(), channel, tx, cancel_rx));

        Ok(SubscriptionHandle::new(cancel_tx, task))
    }
}

async fn pump(mut socket: Socket, keys: Vec<String>, channel: u64, tx: Sender<ViewEvent>, mut cancel_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                debug!("📡 Closing push channel...");
                socket.close(None).await.unwrap_or_else(|e| debug!("Push channel was already closed: {}", e));
                info!("📡 Closing push channel... OK");
                return;
            }
            message = socket.next() => {
                let reason = match message {
                    Some(Ok(Message::Text(text))) => match decode_update(&text, &keys) {
                        Ok(update) if update.samples.is_empty() => continue,
                        Ok(update) => {
                            debug!(subscription_id = update.subscription_id, "🔸 Received {} sample(s)", update.samples.len());
                            if tx.send(ViewEvent::LiveUpdate(update)).await.is_err() {
                                debug!("📡 View is gone, closing push channel");
                                socket.close(None).await.unwrap_or_default();
                                return;
                            }
                            continue;
                        }
                        Err(PlatformError::Json(e)) => {
                            warn!("⚠️ Ignoring malformed push message: {}", e);
                            continue;
                        }
                        Err(e) => e.to_string(),
                    },
                    Some(Ok(Message::Close(frame))) => format!("closed by the platform: {:?}", frame),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => e.to_string(),
                    None => "stream ended".to_string(),
                };

                warn!("🔴 Push channel closed: {}", reason);
                tx.send(ViewEvent::LiveChannelClosed { channel, reason }).await.unwrap_or_default();
                return;
            }
        }
    }
}

/// Decodes one inbound message, keeping the most recent entry of each subscribed key.
pub(crate) fn decode_update(text: &str, keys: &[String]) -> Result<LiveUpdate, PlatformError> {
    let update = serde_json::from_str::<SubscriptionUpdate>(text)?;
    if update.error_code != 0 {
        return Err(PlatformError::Subscription {
            code: update.error_code,
            message: update.error_msg.unwrap_or_default(),
        });
    }

    let samples = update
        .data
        .into_iter()
        .filter(|(key, _)| keys.contains(key))
        .filter_map(|(key, entries)| entries.into_iter().next().map(|(ts, value)| TelemetrySample::new(key, ts, value)))
        .collect();

    Ok(LiveUpdate {
        subscription_id: update.subscription_id,
        samples,
    })
}
