//! Outbound delivery of built vCons.
//!
//! The pipeline talks to the [`Deliver`] trait so the HTTP transport can be
//! swapped for a fake in tests. Implementations never retry: one call is one
//! attempt.

pub mod conserver;

pub use conserver::ConserverClient;

use async_trait::async_trait;

use crate::vcon::Vcon;

/// Acknowledgement from the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAck {
    pub status: u16,
    /// Identifier the remote side assigned, when its response carries one
    pub correlation_id: Option<String>,
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx response
    Delivered(RemoteAck),
    /// Any other HTTP status
    Rejected { status: u16, body: String },
    /// Connection failure, timeout or other transport error
    Unreachable { cause: String },
}

impl DeliveryOutcome {
    /// Diagnostic text stored with a failed Processing Record
    pub fn failure_detail(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Delivered(_) => None,
            DeliveryOutcome::Rejected { status, body } if body.is_empty() => {
                Some(format!("rejected: HTTP {}", status))
            }
            DeliveryOutcome::Rejected { status, body } => {
                Some(format!("rejected: HTTP {}: {}", status, body))
            }
            DeliveryOutcome::Unreachable { cause } => Some(format!("unreachable: {}", cause)),
        }
    }
}

/// Sends a vCon to its destination
#[async_trait]
pub trait Deliver: Send + Sync {
    /// `routing` lists destination queues in order; empty means no routing directive.
    async fn deliver(&self, record: &Vcon, routing: &[String]) -> DeliveryOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_detail() {
        let delivered = DeliveryOutcome::Delivered(RemoteAck {
            status: 200,
            correlation_id: None,
        });
        assert_eq!(delivered.failure_detail(), None);

        let rejected = DeliveryOutcome::Rejected {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(rejected.failure_detail().unwrap(), "rejected: HTTP 503: busy");

        let empty = DeliveryOutcome::Rejected {
            status: 404,
            body: String::new(),
        };
        assert_eq!(empty.failure_detail().unwrap(), "rejected: HTTP 404");

        let unreachable = DeliveryOutcome::Unreachable {
            cause: "connection refused".to_string(),
        };
        assert!(unreachable.failure_detail().unwrap().contains("connection refused"));
    }
}
