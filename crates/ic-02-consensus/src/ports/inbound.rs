//! Driving ports (Inbound API)

use async_trait::async_trait;
use shared_types::Transaction;

use crate::domain::{Ballot, ConsensusResult};
use crate::service::IntakeOutcome;

/// The two entry points for externally delivered protocol messages.
#[async_trait]
pub trait IsaacApi: Send + Sync {
    /// A client transaction arriving at this node.
    ///
    /// On success the signed INIT ballot introducing the transaction is
    /// `broadcasts[0]`.
    async fn receive_message(&self, tx: Transaction) -> ConsensusResult<IntakeOutcome>;

    /// A peer ballot.
    async fn receive_ballot(&self, ballot: Ballot) -> ConsensusResult<IntakeOutcome>;
}
