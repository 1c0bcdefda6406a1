use crate::app_config::Platform;
use crate::domain::session::Session;
use crate::platform::client::{PlatformError, authorized, check_status};
use crate::platform::domain::{LoginRequest, LoginResponse, User};
use reqwest::Client;
use tracing::{info, instrument};

#[instrument(skip_all, fields(username = platform.username()))]
pub async fn login(client: &Client, platform: &Platform) -> Result<Session, PlatformError> {
    info!("🔑 Logging in...");

    let response = client
        .post(format!("{}/api/auth/login", platform.url()))
        .json(&LoginRequest {
            username: platform.username(),
            password: platform.password(),
        })
        .send()
        .await?;

    let login_response = check_status(response).await?.json::<LoginResponse>().await?;
    info!("🔑 Logging in... OK");

    Ok(Session::new(login_response.token, login_response.refresh_token))
}

#[instrument(skip_all)]
pub async fn current_user(client: &Client, platform: &Platform, session: &Session) -> Result<User, PlatformError> {
    let request = authorized(client.get(format!("{}/api/auth/user", platform.url())), session)?;
    let response = check_status(request.send().await?).await?;

    Ok(response.json::<User>().await?)
}
