//! Twilio REST call control.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use collectiq_core::config::CarrierConfig;
use collectiq_core::error::CollectIqError;
use collectiq_core::ports::CallControl;

use crate::twiml;

/// Redirects live calls by updating them with new TwiML.
pub struct TwilioCallControl {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

impl TwilioCallControl {
    pub fn from_config(config: &CarrierConfig) -> Result<Self> {
        let account_sid = config
            .resolve_account_sid()
            .ok_or_else(|| anyhow::anyhow!("No carrier account sid configured"))?;
        let auth_token = config
            .resolve_auth_token()
            .ok_or_else(|| anyhow::anyhow!("No carrier auth token configured"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            api_base: config.api_base().trim_end_matches('/').to_string(),
        })
    }

    pub fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{call_sid}.json",
            self.api_base, self.account_sid
        )
    }

    async fn update_call(&self, call_sid: &str, twiml: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.call_url(call_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", twiml)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("carrier API error {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn transfer_call(
        &self,
        call_id: &str,
        destination: &str,
    ) -> collectiq_core::error::Result<()> {
        match self.update_call(call_id, &twiml::transfer(destination)).await {
            Ok(()) => {
                info!(call_sid = call_id, "Call transferred");
                Ok(())
            }
            Err(e) => {
                warn!(call_sid = call_id, error = %e, "Call transfer failed");
                Err(CollectIqError::Carrier(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_url() {
        let config = CarrierConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("secret".into()),
            api_base: Some("https://api.twilio.com/".into()),
            ..Default::default()
        };
        let control = TwilioCallControl::from_config(&config).unwrap();
        assert_eq!(
            control.call_url("CA9"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls/CA9.json"
        );
    }

    #[test]
    fn test_requires_credentials() {
        let config = CarrierConfig {
            account_sid: Some("AC123".into()),
            ..Default::default()
        };
        assert!(TwilioCallControl::from_config(&config).is_err());
    }
}
