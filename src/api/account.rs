use super::client::ApiClient;
use super::types::{CommissionData, MarginData, UserData};
use crate::core::config::ClientConfig;
use crate::core::errors::CallError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct LoginArguments {
    user_id: String,
    password: String,
    app_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    stream_session_id: Option<String>,
}

#[derive(Serialize)]
struct CommissionArguments<'a> {
    symbol: &'a str,
    volume: f64,
}

impl ApiClient {
    /// Authenticate and return the session id required by the stream channel
    #[instrument(skip_all, fields(app_name = %config.app_name))]
    pub async fn login(&self, config: &ClientConfig) -> Result<String, CallError> {
        let arguments = LoginArguments {
            user_id: config.user_id().to_string(),
            password: config.password().to_string(),
            app_name: config.app_name.clone(),
        };

        let response: LoginResponse = self.request("login", Some(&arguments)).await?;
        let session_id = response
            .stream_session_id
            .ok_or_else(|| CallError::Decode("login response without streamSessionId".to_string()))?;

        info!("Logged in");
        Ok(session_id)
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), CallError> {
        self.request::<(), Value>("logout", None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_current_user_data(&self) -> Result<UserData, CallError> {
        self.request::<(), _>("getCurrentUserData", None).await
    }

    #[instrument(skip(self))]
    pub async fn get_margin_level(&self) -> Result<MarginData, CallError> {
        self.request::<(), _>("getMarginLevel", None).await
    }

    /// Commission and conversion rate for a prospective trade
    #[instrument(skip(self))]
    pub async fn get_commission_def(
        &self,
        symbol: &str,
        volume: f64,
    ) -> Result<CommissionData, CallError> {
        self.request("getCommissionDef", Some(&CommissionArguments { symbol, volume }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ApiOptions;
    use crate::core::kernel::mock;
    use serde_json::json;

    #[tokio::test]
    async fn test_login_sends_credentials_and_returns_session() {
        let (conn, mut peer) = mock::pair();
        let client = ApiClient::new(ApiOptions::demo());
        client.attach(conn).await;
        let config = ClientConfig::new("1000001".to_string(), "hunter2".to_string())
            .app_name("tests");

        let login = client.login(&config);
        let respond = async {
            let request: Value = serde_json::from_str(&peer.next_sent().await.unwrap()).unwrap();
            assert_eq!(
                request,
                json!({
                    "command": "login",
                    "arguments": {"userId": "1000001", "password": "hunter2", "appName": "tests"}
                })
            );
            peer.push(r#"{"status":true,"streamSessionId":"8469308861804289383"}"#);
        };

        let (session, ()) = tokio::join!(login, respond);
        assert_eq!(session.unwrap(), "8469308861804289383");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (conn, mut peer) = mock::pair();
        let client = ApiClient::new(ApiOptions::demo());
        client.attach(conn).await;
        let config = ClientConfig::new("1000001".to_string(), "wrong".to_string());

        let login = client.login(&config);
        let respond = async {
            peer.next_sent().await.unwrap();
            peer.push(r#"{"status":false,"errorCode":"BE005","errorDescr":"userPasswordCheck: Invalid login or password"}"#);
        };

        let (result, ()) = tokio::join!(login, respond);
        assert!(matches!(result, Err(CallError::Remote { code, .. }) if code == "BE005"));
    }

    #[tokio::test]
    async fn test_login_without_session_id() {
        let (conn, mut peer) = mock::pair();
        let client = ApiClient::new(ApiOptions::demo());
        client.attach(conn).await;
        let config = ClientConfig::new("1000001".to_string(), "hunter2".to_string());

        let login = client.login(&config);
        let respond = async {
            peer.next_sent().await.unwrap();
            peer.push(r#"{"status":true}"#);
        };

        let (result, ()) = tokio::join!(login, respond);
        assert!(matches!(result, Err(CallError::Decode(_))));
    }

    #[tokio::test]
    async fn test_margin_level() {
        let (conn, mut peer) = mock::pair();
        let client = ApiClient::new(ApiOptions::demo());
        client.attach(conn).await;

        let call = client.get_margin_level();
        let respond = async {
            peer.next_sent().await.unwrap();
            peer.push(
                r#"{"status":true,"returnData":{"balance":995800269.43,"credit":1000.00,"currency":"PLN","equity":995985397.56,"margin":572634.43,"margin_free":995227635.00,"margin_level":173930.41}}"#,
            );
        };

        let (margin, ()) = tokio::join!(call, respond);
        let margin = margin.unwrap();
        assert_eq!(margin.currency, "PLN");
        assert_eq!(margin.margin_free, 995227635.00);
    }
}
