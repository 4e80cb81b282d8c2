//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Primitives**: `Hash`, `Signature`, `Address`
//! - **Transactions**: `Transaction`, `TransactionBody`, `Operation`
//! - **Ledger**: `Account`, `Block`, `BlockHeader`
//! - **Persisted records**: `BlockTransaction`, `BlockOperation`, `TransactionHistory`

use crate::{canonical_hash, KeyPair, TypesError, TypesResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, Bytes};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte SHA-256 hash.
pub type Hash = [u8; 32];

/// A 64-byte ed25519 signature.
pub type Signature = [u8; 64];

/// Account or node address: the raw ed25519 public key.
///
/// Serialized as a lowercase hex string so it can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Eight-byte hex prefix used in log fields.
    pub fn short(&self) -> String {
        crate::short_hex(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex {
            what: "address",
            reason: e.to_string(),
        })?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| TypesError::InvalidHex {
            what: "address",
            reason: "expected 32 bytes".into(),
        })?;
        Ok(Address(key))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Address)
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A single state change carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Create `target` funded with `amount`.
    CreateAccount { target: Address, amount: u64 },
    /// Move `amount` to an existing `target`.
    Payment { target: Address, amount: u64 },
}

impl Operation {
    pub fn target(&self) -> Address {
        match self {
            Operation::CreateAccount { target, .. } | Operation::Payment { target, .. } => *target,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            Operation::CreateAccount { amount, .. } | Operation::Payment { amount, .. } => *amount,
        }
    }

    /// Name used in persisted records.
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::CreateAccount { .. } => "create-account",
            Operation::Payment { .. } => "payment",
        }
    }
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    /// Paying account.
    pub source: Address,
    /// Fee debited from `source` on top of the operation amounts.
    pub fee: u64,
    /// Must equal the source account's current checkpoint.
    pub checkpoint: Hash,
    pub operations: Vec<Operation>,
    /// Client-side creation time (millis).
    pub created: u64,
}

/// A client transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
    pub body: TransactionBody,
}

impl Transaction {
    /// Hash and sign `body` with `keypair`.
    pub fn new(keypair: &KeyPair, network_id: &[u8], body: TransactionBody) -> TypesResult<Self> {
        let hash = canonical_hash(&body)?;
        let signature = keypair.sign_hash(network_id, &hash);
        Ok(Self {
            hash,
            signature,
            body,
        })
    }

    pub fn source(&self) -> Address {
        self.body.source
    }

    /// Sum of all operation amounts, `None` on overflow.
    pub fn total_amount(&self) -> Option<u64> {
        self.body
            .operations
            .iter()
            .try_fold(0u64, |acc, op| acc.checked_add(op.amount()))
    }

    /// Amount plus fee, `None` on overflow.
    pub fn total_cost(&self) -> Option<u64> {
        self.total_amount()?.checked_add(self.body.fee)
    }

    /// Recompute the body hash and compare with the stored one.
    pub fn verify_hash(&self) -> TypesResult<()> {
        let computed = canonical_hash(&self.body)?;
        if computed != self.hash {
            return Err(TypesError::HashMismatch {
                expected: crate::short_hex(&self.hash),
                computed: crate::short_hex(&computed),
            });
        }
        Ok(())
    }

    /// Hash check plus signature check against the source account key.
    pub fn verify(&self, network_id: &[u8]) -> TypesResult<()> {
        self.verify_hash()?;
        self.body
            .source
            .verify_hash(network_id, &self.hash, &self.signature)
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Persisted account state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    /// Hash of the last transaction that touched this account as source
    /// (or created it).
    pub checkpoint: Hash,
}

impl Account {
    pub fn new(address: Address, balance: u64, checkpoint: Hash) -> Self {
        Self {
            address,
            balance,
            checkpoint,
        }
    }
}

/// Hashed part of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub prev_block_hash: Hash,
    /// Round number in which the block was agreed.
    pub round: u64,
    pub proposer: Address,
    pub transactions: Vec<Hash>,
    /// Running total of transactions including this block.
    pub total_txs: u64,
    pub confirmed: u64,
}

/// A confirmed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash,
    pub header: BlockHeader,
}

impl Block {
    pub fn new(header: BlockHeader) -> TypesResult<Self> {
        let hash = canonical_hash(&header)?;
        Ok(Self { hash, header })
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn total_txs(&self) -> u64 {
        self.header.total_txs
    }
}

// =============================================================================
// PERSISTED RECORDS
// =============================================================================

/// A transaction as recorded inside a confirmed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub hash: Hash,
    pub block_hash: Hash,
    pub block_height: u64,
    /// Position inside the block.
    pub index: u32,
    pub source: Address,
    pub fee: u64,
    pub amount: u64,
    pub operations: Vec<Hash>,
    pub created: u64,
    pub confirmed: u64,
}

/// A single operation recorded inside a confirmed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOperation {
    pub hash: Hash,
    pub tx_hash: Hash,
    pub index: u32,
    #[serde(rename = "type")]
    pub op_type: String,
    pub source: Address,
    pub target: Address,
    pub amount: u64,
}

impl BlockOperation {
    pub fn from_operation(tx: &Transaction, index: u32, op: &Operation) -> TypesResult<Self> {
        Ok(Self {
            hash: canonical_hash(&(tx.hash, index))?,
            tx_hash: tx.hash,
            index,
            op_type: op.type_name().to_string(),
            source: tx.source(),
            target: op.target(),
            amount: op.amount(),
        })
    }
}

/// Lifecycle status of a transaction known to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Submitted,
    Confirmed,
}

/// Per-transaction history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub hash: Hash,
    pub source: Address,
    pub status: TransactionStatus,
    pub block_height: Option<u64>,
    pub created: u64,
    pub confirmed: Option<u64>,
}
