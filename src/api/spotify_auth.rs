use crate::config::Config;
use crate::db;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use tracing::info;
use url::Url;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";
const SCOPES: &[&str] = &[
    "playlist-modify-public",
    "playlist-modify-private",
    "playlist-read-private",
];

#[derive(Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn prompt(question: &str) -> Result<String> {
    println!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Build the URL the user opens to grant playlist access.
pub fn authorize_url(client_id: &str, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse("https://accounts.spotify.com/authorize")?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("show_dialog", "true");
    Ok(url)
}

/// Pull the `code` query parameter out of a pasted redirect URL.
pub fn code_from_redirect(redirect: &str) -> Result<String> {
    let parsed = Url::parse(redirect.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("no code in redirect URL"))
}

/// Manual authorization-code flow:
/// 1. Print the Spotify authorization URL.
/// 2. The user approves and lands on the redirect URI (which may not be served).
/// 3. The user pastes the full redirect URL back here.
/// 4. The `code` param is exchanged for an access_token + refresh_token.
/// 5. Tokens and client credentials are stored in the credentials table.
pub async fn run_spotify_auth(cfg: &Config) -> Result<()> {
    let client_id = match cfg.spotify_client_id.clone().filter(|s| !s.is_empty()) {
        Some(id) => id,
        None => prompt("Enter your Spotify client_id:")?,
    };
    if client_id.is_empty() {
        return Err(anyhow!("no client_id provided"));
    }
    let client_secret = match cfg.spotify_client_secret.clone().filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => prompt("Enter your Spotify client_secret:")?,
    };
    if client_secret.is_empty() {
        return Err(anyhow!("no client_secret provided"));
    }
    let redirect_uri = {
        let entered = prompt(&format!(
            "Enter your Spotify redirect URI (leave blank for {}):",
            DEFAULT_REDIRECT_URI
        ))?;
        if entered.is_empty() {
            DEFAULT_REDIRECT_URI.to_string()
        } else {
            entered
        }
    };

    let url = authorize_url(&client_id, &redirect_uri)?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    let pasted = prompt("After authorizing, paste the full redirect URL here:")?;
    let code = code_from_redirect(&pasted)?;

    let auth_base = std::env::var("SPOTIFY_AUTH_BASE")
        .unwrap_or_else(|_| "https://accounts.spotify.com".into());
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
    ];
    let auth_header = format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
    );
    let resp = Client::new()
        .post(format!("{}/api/token", auth_base))
        .header("Authorization", auth_header)
        .form(&params)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }

    let tr: TokenResponse = resp.json().await?;
    let stored_token = crate::api::spotify::StoredToken {
        access_token: tr.access_token,
        token_type: tr.token_type,
        expires_at: chrono::Utc::now().timestamp() + tr.expires_in,
        refresh_token: tr.refresh_token,
        scope: tr.scope,
    };
    let token_json = serde_json::to_string(&stored_token)?;
    let db_path = cfg.db_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::save_credential_raw(
            &conn,
            "spotify",
            &token_json,
            Some(&client_id),
            Some(&client_secret),
        )?;
        Ok(())
    })
    .await??;

    info!("Spotify tokens saved to DB for provider 'spotify'");
    println!("Saved tokens. You can now run `setlist-sync sync`.");
    Ok(())
}
