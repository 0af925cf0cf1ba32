use super::ServerConfig;

/// Validate the merged configuration.
pub fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_realtime_url(&config.realtime_url)?;
    validate_public_host(&config.public_host)?;
    config
        .bridge
        .validate()
        .map_err(|e| format!("Invalid bridge configuration: {e}"))?;
    Ok(())
}

/// The engine endpoint must be a WebSocket URL.
pub fn validate_realtime_url(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !(url.starts_with("wss://") || url.starts_with("ws://")) {
        return Err(format!("OPENAI_REALTIME_URL must be a ws:// or wss:// URL, got {url}").into());
    }
    Ok(())
}

/// The public host is a bare host name (optionally with a port), not a URL.
pub fn validate_public_host(public_host: &Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(host) = public_host else {
        return Ok(());
    };

    if host.is_empty() {
        return Err("PUBLIC_HOST cannot be empty".into());
    }
    if host.contains("://") || host.contains('/') {
        return Err(format!(
            "PUBLIC_HOST must be a host name without scheme or path, got {host}"
        )
        .into());
    }
    if host.chars().any(char::is_whitespace) {
        return Err(format!("PUBLIC_HOST contains whitespace: {host:?}").into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_realtime_url() {
        assert!(validate_realtime_url("wss://api.openai.com/v1/realtime").is_ok());
        assert!(validate_realtime_url("ws://localhost:9000").is_ok());
        assert!(validate_realtime_url("https://api.openai.com/v1/realtime").is_err());
        assert!(validate_realtime_url("").is_err());
    }

    #[test]
    fn test_validate_public_host() {
        assert!(validate_public_host(&None).is_ok());
        assert!(validate_public_host(&Some("voice.example.com".to_string())).is_ok());
        assert!(validate_public_host(&Some("localhost:5050".to_string())).is_ok());

        let result = validate_public_host(&Some("https://voice.example.com".to_string()));
        assert!(result.unwrap_err().to_string().contains("without scheme"));
        assert!(validate_public_host(&Some("example.com/media".to_string())).is_err());
        assert!(validate_public_host(&Some(String::new())).is_err());
        assert!(validate_public_host(&Some("voice example.com".to_string())).is_err());
    }
}
