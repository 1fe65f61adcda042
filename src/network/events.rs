use crate::events::{
    dispatcher,
    model::{LogEvent, LogLevel, NetworkEvent},
};

/// The network-facing components that emit structured events, tagged into
/// `EventMeta.component` so the audit log can be filtered per subsystem.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NetComponent {
    Hub,
    PeerLink,
    Listener,
    Dialer,
}

impl NetComponent {
    fn as_str(self) -> &'static str {
        match self {
            NetComponent::Hub => "hub",
            NetComponent::PeerLink => "peer_link",
            NetComponent::Listener => "listener",
            NetComponent::Dialer => "dialer",
        }
    }
}

/// Emit a structured network event with optional console output suppression.
pub(crate) fn emit_network_event(
    component: NetComponent,
    level: LogLevel,
    action: &str,
    addr: Option<String>,
    detail: Option<String>,
    allow_console: bool,
) {
    let mut meta = dispatcher::meta(component.as_str(), level);
    meta.corr_id = Some(dispatcher::correlation_id());
    if !allow_console {
        meta.suppress_console = true;
    }
    dispatcher::emit(LogEvent::Network(NetworkEvent {
        meta,
        action: action.to_string(),
        addr,
        detail,
    }));
}
