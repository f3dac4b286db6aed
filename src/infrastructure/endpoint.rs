use crate::domain::ports::{Endpoint, TransportBox};
use crate::error::{GatewayError, IoStage, Result};
use tracing::{debug, warn};

/// Sends frames to the primary host, failing over once to the secondary.
///
/// Failover only happens when nothing reached the primary (refused
/// connection or connect timeout). Once a request has been written, any
/// failure is returned as-is since the host may have acted on it.
pub struct EndpointSelector {
    primary: Endpoint,
    secondary: Option<Endpoint>,
    transport: TransportBox,
}

impl EndpointSelector {
    pub fn new(primary: Endpoint, secondary: Option<Endpoint>, transport: TransportBox) -> Self {
        Self {
            primary,
            secondary,
            transport,
        }
    }

    pub fn primary(&self) -> &Endpoint {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Endpoint> {
        self.secondary.as_ref()
    }

    pub async fn send(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let err = match self.transport.exchange(&self.primary, frame).await {
            Ok(response) => {
                debug!(endpoint = %self.primary, bytes = response.len(), "response received");
                return Ok(response);
            }
            Err(err) => err,
        };

        let Some(secondary) = self.secondary.as_ref().filter(|_| fails_over(&err)) else {
            return Err(err);
        };
        warn!(
            primary = %self.primary,
            secondary = %secondary,
            error = %err,
            "primary host unavailable, failing over"
        );
        let response = self.transport.exchange(secondary, frame).await?;
        debug!(endpoint = %secondary, bytes = response.len(), "response received");
        Ok(response)
    }
}

fn fails_over(err: &GatewayError) -> bool {
    matches!(
        err,
        GatewayError::ConnectionRefused { .. }
            | GatewayError::Timeout {
                stage: IoStage::Connect,
                ..
            }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Transport;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Outcome = fn(&Endpoint) -> Result<Vec<u8>>;

    #[derive(Clone, Default)]
    struct StubTransport {
        outcomes: HashMap<u16, Outcome>,
        calls: Arc<Mutex<Vec<u16>>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn exchange(&self, endpoint: &Endpoint, _frame: &[u8]) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(endpoint.port);
            (self.outcomes[&endpoint.port])(endpoint)
        }
    }

    fn ok(_: &Endpoint) -> Result<Vec<u8>> {
        Ok(b"reply".to_vec())
    }

    fn refused(endpoint: &Endpoint) -> Result<Vec<u8>> {
        Err(GatewayError::ConnectionRefused {
            endpoint: endpoint.to_string(),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        })
    }

    fn response_timeout(endpoint: &Endpoint) -> Result<Vec<u8>> {
        Err(GatewayError::Timeout {
            endpoint: endpoint.to_string(),
            stage: IoStage::Response,
        })
    }

    fn selector(primary: Outcome, secondary: Option<Outcome>) -> (EndpointSelector, StubTransport) {
        let mut stub = StubTransport::default();
        stub.outcomes.insert(1, primary);
        if let Some(outcome) = secondary {
            stub.outcomes.insert(2, outcome);
        }
        let selector = EndpointSelector::new(
            Endpoint::new("primary", 1),
            secondary.map(|_| Endpoint::new("secondary", 2)),
            Box::new(stub.clone()),
        );
        (selector, stub)
    }

    #[tokio::test]
    async fn test_primary_success() {
        let (selector, stub) = selector(ok, Some(ok));
        assert_eq!(selector.send(b"x").await.unwrap(), b"reply");
        assert_eq!(*stub.calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_failover_on_refusal() {
        let (selector, stub) = selector(refused, Some(ok));
        assert_eq!(selector.send(b"x").await.unwrap(), b"reply");
        assert_eq!(*stub.calls.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failover_happens_once() {
        let (selector, stub) = selector(refused, Some(refused));
        let err = selector.send(b"x").await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionRefused { endpoint, .. } if endpoint == "secondary:2"));
        assert_eq!(*stub.calls.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_no_failover_after_request_written() {
        let (selector, stub) = selector(response_timeout, Some(ok));
        let err = selector.send(b"x").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Timeout {
                stage: IoStage::Response,
                ..
            }
        ));
        assert_eq!(*stub.calls.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_refusal_without_secondary() {
        let (selector, _) = selector(refused, None);
        assert!(selector.secondary().is_none());
        assert!(matches!(
            selector.send(b"x").await,
            Err(GatewayError::ConnectionRefused { .. })
        ));
    }
}
