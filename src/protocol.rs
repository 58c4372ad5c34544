//! Messages exchanged with worker windows.
//!
//! Both directions serialize as JSON objects tagged by `type`, using the
//! channel names the window pages already listen on.

use serde::{Deserialize, Serialize};

use crate::models::{ThemeOptions, WindowId};

pub const UNATTACHED_SITE_KEY: &str = "unattached";
pub const DEFAULT_TOKEN_HOST: &str = "http://checkout.shopify.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    RequestStartHarvestCaptcha {
        request_id: String,
        site_key: String,
        host: String,
        #[serde(default)]
        checkpoint: bool,
    },
    RequestStopHarvestCaptcha {
        request_id: String,
        site_key: String,
        host: String,
    },
    HarvestCaptcha {
        request_id: String,
        token: String,
        #[serde(default)]
        site_key: Option<String>,
        #[serde(default)]
        host: Option<String>,
    },
    RequestSaveCaptchaProxy {
        window_id: WindowId,
        #[serde(default)]
        proxy: Option<String>,
    },
    RequestCloseWindow,
    RequestCloseAllCaptchaWindows,
    RequestEndSession,
    RequestLaunchYoutube,
    RequestRefresh,
}

impl InboundMessage {
    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::RequestStartHarvestCaptcha { .. } => "RequestStartHarvestCaptcha",
            InboundMessage::RequestStopHarvestCaptcha { .. } => "RequestStopHarvestCaptcha",
            InboundMessage::HarvestCaptcha { .. } => "HarvestCaptcha",
            InboundMessage::RequestSaveCaptchaProxy { .. } => "RequestSaveCaptchaProxy",
            InboundMessage::RequestCloseWindow => "RequestCloseWindow",
            InboundMessage::RequestCloseAllCaptchaWindows => "RequestCloseAllCaptchaWindows",
            InboundMessage::RequestEndSession => "RequestEndSession",
            InboundMessage::RequestLaunchYoutube => "RequestLaunchYoutube",
            InboundMessage::RequestRefresh => "RequestRefresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    StartHarvestCaptcha {
        request_id: String,
        site_key: String,
        host: String,
    },
    StopHarvestCaptcha {
        request_id: String,
        site_key: String,
        host: String,
    },
    ChangeTheme {
        options: ThemeOptions,
    },
    RequestShowProxy {
        proxy: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugQuery {
    #[serde(rename = "viewCwmQueueStats")]
    QueueStats,
    #[serde(rename = "viewCwmHarvestState")]
    HarvestState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn harvest_message_accepts_missing_site_key_and_host() {
        let message: InboundMessage = serde_json::from_value(json!({
            "type": "HarvestCaptcha",
            "requestId": "task-1",
            "token": "03AGdBq2"
        }))
        .unwrap();

        assert_eq!(
            message,
            InboundMessage::HarvestCaptcha {
                request_id: "task-1".into(),
                token: "03AGdBq2".into(),
                site_key: None,
                host: None,
            }
        );
    }

    #[test]
    fn outbound_messages_use_camel_case_fields() {
        let value = serde_json::to_value(OutboundMessage::StartHarvestCaptcha {
            request_id: "r".into(),
            site_key: "k".into(),
            host: "h".into(),
        })
        .unwrap();

        assert_eq!(
            value,
            json!({"type": "StartHarvestCaptcha", "requestId": "r", "siteKey": "k", "host": "h"})
        );
    }

    #[test]
    fn unit_commands_parse_from_bare_type() {
        let message: InboundMessage =
            serde_json::from_value(json!({"type": "RequestRefresh"})).unwrap();
        assert_eq!(message.name(), "RequestRefresh");
    }
}
