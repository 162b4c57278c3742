//! `ahasend listen webhooks|routes`.
//!
//! Flags are turned into [`ListenOptions`] and fully validated before any
//! network call; only then is the config loaded and the session started.

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::listen::{
    forward, ApiClient, EventFilter, ListenOptions, RenderMode, Session, SessionEnd, StreamKind,
    StreamTarget, TerminalPrompt,
};

/// Flags shared by both stream kinds.
#[derive(Debug, Clone, Default, Args)]
pub struct ListenFlags {
    /// Stream a temporary stream for recipients matching this pattern (e.g. "*@example.com")
    #[arg(long)]
    pub recipient: Option<String>,

    /// Forward each event payload to this local URL, signed
    #[arg(long, value_name = "URL")]
    pub forward_to: Option<String>,

    /// Signing secret for forwarded events (generated when omitted)
    #[arg(long)]
    pub secret: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub skip_verify: bool,

    /// Print only type, from, to and subject
    #[arg(long)]
    pub slim: bool,

    /// Disconnect any other listener on this stream without asking
    #[arg(long)]
    pub force_reconnect: bool,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,
}

/// `listen webhooks` arguments.
#[derive(Debug, Clone, Default, Args)]
pub struct WebhookArgs {
    /// Existing webhook to stream
    #[arg(long)]
    pub webhook_id: Option<String>,

    /// Only show these event types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub events: Vec<String>,

    #[command(flatten)]
    pub flags: ListenFlags,
}

/// `listen routes` arguments.
#[derive(Debug, Clone, Default, Args)]
pub struct RouteArgs {
    /// Existing inbound route to stream
    #[arg(long)]
    pub route_id: Option<String>,

    #[command(flatten)]
    pub flags: ListenFlags,
}

/// Options for a webhook stream.
pub fn webhook_options(args: &WebhookArgs) -> Result<ListenOptions> {
    let target = StreamTarget::from_flags(
        StreamKind::Webhooks,
        args.webhook_id.as_deref(),
        args.flags.recipient.as_deref(),
    )?;
    let mut options = ListenOptions::new(StreamKind::Webhooks, target);
    options.event_filter = EventFilter::new(
        args.events
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty()),
    );
    apply_flags(options, &args.flags)
}

/// Options for a route stream.
pub fn route_options(args: &RouteArgs) -> Result<ListenOptions> {
    let target = StreamTarget::from_flags(
        StreamKind::Routes,
        args.route_id.as_deref(),
        args.flags.recipient.as_deref(),
    )?;
    apply_flags(ListenOptions::new(StreamKind::Routes, target), &args.flags)
}

fn apply_flags(mut options: ListenOptions, flags: &ListenFlags) -> Result<ListenOptions> {
    options.forward_to = flags
        .forward_to
        .as_deref()
        .map(forward::parse_target)
        .transpose()?;
    options.secret = flags.secret.clone();
    options.skip_tls_verify = flags.skip_verify;
    options.mode = if flags.slim {
        RenderMode::Slim
    } else {
        RenderMode::Full
    };
    options.force_reconnect = flags.force_reconnect;
    options.color = !flags.no_color && atty::is(atty::Stream::Stdout);

    if options.secret.is_some() && options.forward_to.is_none() {
        log::warn!("--secret has no effect without --forward-to");
    }
    options.validate()?;
    Ok(options)
}

/// Load credentials and run the session on stdout until it ends.
pub async fn run(options: ListenOptions, cancel: CancellationToken) -> Result<SessionEnd> {
    let config = Config::load()?;
    config.require_credentials()?;

    let api = ApiClient::new(&config.api_url, &config.api_key, &config.account_id)
        .context("failed to create API client")?;

    let end = Session::new(options, &config.api_key)
        .run(&api, &TerminalPrompt, std::io::stdout(), cancel)
        .await?;

    match end {
        SessionEnd::Interrupted => eprintln!("Stopped."),
        SessionEnd::Closed => eprintln!("Stream closed by server."),
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(id: &str) -> WebhookArgs {
        WebhookArgs {
            webhook_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_webhook_options_defaults() {
        let options = webhook_options(&webhook("wh-1")).unwrap();
        assert_eq!(options.kind, StreamKind::Webhooks);
        assert_eq!(options.target, StreamTarget::Existing("wh-1".to_string()));
        assert_eq!(options.mode, RenderMode::Full);
        assert!(options.event_filter.is_empty());
        assert!(options.forward_to.is_none());
        assert!(!options.force_reconnect);
    }

    #[test]
    fn test_webhook_events_become_filter() {
        let mut args = webhook("wh-1");
        args.events = vec!["message.opened".to_string(), " ".to_string()];
        args.flags.slim = true;

        let options = webhook_options(&args).unwrap();
        assert!(options.event_filter.allows("message.opened"));
        assert!(!options.event_filter.allows("message.delivered"));
        assert_eq!(options.mode, RenderMode::Slim);
    }

    #[test]
    fn test_invalid_forward_url_fails_before_network() {
        let mut args = RouteArgs {
            route_id: Some("route-1".to_string()),
            ..Default::default()
        };
        args.flags.forward_to = Some("localhost:3000".to_string());

        let err = route_options(&args).unwrap_err().to_string();
        assert!(err.contains("invalid forward URL"), "{err}");
    }

    #[test]
    fn test_forward_and_secret_flags() {
        let mut args = RouteArgs {
            route_id: None,
            flags: ListenFlags {
                recipient: Some("*@example.com".to_string()),
                forward_to: Some("http://localhost:3000/inbound".to_string()),
                secret: Some("aha-whsec-fixed".to_string()),
                force_reconnect: true,
                no_color: true,
                ..Default::default()
            },
        };

        let options = route_options(&args).unwrap();
        assert_eq!(
            options.forward_to.as_ref().map(|u| u.as_str()),
            Some("http://localhost:3000/inbound")
        );
        assert_eq!(options.secret.as_deref(), Some("aha-whsec-fixed"));
        assert!(options.force_reconnect);
        assert!(!options.color);

        args.flags.secret = Some("wrong-prefix".to_string());
        assert!(route_options(&args).is_err());
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let err = route_options(&RouteArgs::default()).unwrap_err();
        assert!(err.to_string().contains("--route-id"), "{err}");
    }
}
