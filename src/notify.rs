use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for formatted alert text. Never fails loudly: `false` means not delivered.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> bool;
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        let form = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
        ];
        let response = self
            .client
            .post(self.endpoint())
            .form(&form)
            .timeout(SEND_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(r) if r.status().as_u16() == 200 => true,
            Ok(r) => {
                warn!("Telegram rejected message: HTTP {}", r.status());
                false
            }
            Err(e) => {
                // reqwest errors can embed the URL, which carries the bot token
                warn!("Telegram send failed: {}", e.without_url());
                false
            }
        }
    }
}
