use anyhow::Result;
use log::{debug, error};

use crate::{models::WindowId, protocol::InboundMessage};

use super::CaptchaHarvester;

impl CaptchaHarvester {
    /// Start, stop and close-all come from clients and are accepted from any
    /// sender. Everything else must come from a live harvesting window.
    pub async fn handle_message(&self, sender: WindowId, message: InboundMessage) {
        let name = message.name();
        let gated = !matches!(
            message,
            InboundMessage::RequestStartHarvestCaptcha { .. }
                | InboundMessage::RequestStopHarvestCaptcha { .. }
                | InboundMessage::RequestCloseAllCaptchaWindows
        );
        if gated && !self.is_valid_sender(sender).await {
            debug!("Dropping {name} from stale sender {sender}");
            return;
        }

        if let Err(err) = self.dispatch(sender, message).await {
            error!("{name} from window {sender} failed: {err:#}");
        }
    }

    async fn dispatch(&self, sender: WindowId, message: InboundMessage) -> Result<()> {
        match message {
            InboundMessage::RequestStartHarvestCaptcha {
                request_id,
                site_key,
                host,
                checkpoint,
            } => {
                self.start_harvesting(&request_id, &site_key, &host, checkpoint)
                    .await
            }
            InboundMessage::RequestStopHarvestCaptcha {
                request_id,
                site_key,
                host,
            } => {
                self.stop_harvesting(&request_id, &site_key, &host).await;
                Ok(())
            }
            InboundMessage::HarvestCaptcha {
                request_id,
                token,
                site_key,
                host,
            } => {
                self.harvest_token(&request_id, token, site_key, host).await;
                Ok(())
            }
            InboundMessage::RequestSaveCaptchaProxy { window_id, proxy } => {
                self.save_proxy(window_id, proxy).await
            }
            InboundMessage::RequestCloseWindow => self.close_window(sender).await,
            InboundMessage::RequestCloseAllCaptchaWindows => {
                self.close_all_windows().await;
                Ok(())
            }
            InboundMessage::RequestEndSession => self.end_session(sender).await,
            InboundMessage::RequestLaunchYoutube => self.launch_companion(sender).await.map(|_| ()),
            InboundMessage::RequestRefresh => self.refresh(sender),
        }
    }
}
