//! The authoritative ledger: reactor records, the read/write interface and
//! leaderboard assembly.
//!
//! The ledger is slow and trusted. Everything else in the crate is a
//! cache of it, so ledger state wins every tie.

use crate::board::Cell;
use crate::identity::Address;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Ledger-assigned reactor identifier; unique and increasing.
pub type ReactorId = u64;

// ============================================================================
// ENERGY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid energy level {0} (expected 1, 3, 5 or 10)")]
pub struct InvalidEnergy(pub u32);

/// Reactor blast energy chosen at deploy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
    Ultra,
}

impl EnergyLevel {
    pub const ALL: [EnergyLevel; 4] = [
        EnergyLevel::Low,
        EnergyLevel::Medium,
        EnergyLevel::High,
        EnergyLevel::Ultra,
    ];

    pub fn value(self) -> u32 {
        match self {
            EnergyLevel::Low => 1,
            EnergyLevel::Medium => 3,
            EnergyLevel::High => 5,
            EnergyLevel::Ultra => 10,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.value() == value)
    }

    /// Contract reactor type for this energy.
    pub fn reactor_type(self) -> ReactorType {
        match self {
            EnergyLevel::Ultra => ReactorType::Ultra,
            EnergyLevel::High => ReactorType::High,
            EnergyLevel::Medium => ReactorType::Medium,
            EnergyLevel::Low => ReactorType::Low,
        }
    }

    /// Uniform pick among the four levels (the deploy panel's "random").
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl TryFrom<u32> for EnergyLevel {
    type Error = InvalidEnergy;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or(InvalidEnergy(value))
    }
}

impl From<EnergyLevel> for u32 {
    fn from(level: EnergyLevel) -> Self {
        level.value()
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reactor type code {0}")]
pub struct InvalidReactorType(pub u8);

/// Contract-side reactor type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ReactorType {
    Ultra = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl ReactorType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn energy(self) -> EnergyLevel {
        match self {
            ReactorType::Ultra => EnergyLevel::Ultra,
            ReactorType::High => EnergyLevel::High,
            ReactorType::Medium => EnergyLevel::Medium,
            ReactorType::Low => EnergyLevel::Low,
        }
    }
}

impl TryFrom<u8> for ReactorType {
    type Error = InvalidReactorType;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ReactorType::Ultra),
            1 => Ok(ReactorType::High),
            2 => Ok(ReactorType::Medium),
            3 => Ok(ReactorType::Low),
            other => Err(InvalidReactorType(other)),
        }
    }
}

impl From<ReactorType> for u8 {
    fn from(kind: ReactorType) -> Self {
        kind.code()
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Hash of a submitted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reactor as the ledger reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactor {
    pub id: ReactorId,
    pub x: u8,
    pub y: u8,
    pub energy: EnergyLevel,
    pub owner: Address,
    pub is_active: bool,
    pub round: u32,
}

impl Reactor {
    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }
}

// ============================================================================
// INTERFACE
// ============================================================================

/// Ledger call failures. None of them are retried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger rejected the transaction: {0}")]
    Rejected(String),

    #[error("ledger call timed out after {0}ms")]
    Timeout(u64),
}

impl LedgerError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Read/write path into the authoritative contract state.
///
/// Writes return once the transaction is accepted; the reactor becomes
/// visible to `all_reactors` only once it lands.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Full scan of every reactor ever deployed.
    async fn all_reactors(&self) -> Result<Vec<Reactor>, LedgerError>;

    /// Cumulative score of a player across rounds.
    async fn player_score(&self, player: &Address) -> Result<u64, LedgerError>;

    async fn deploy_reactor(
        &self,
        owner: &Address,
        cell: Cell,
        reactor_type: ReactorType,
        energy: EnergyLevel,
    ) -> Result<TxHash, LedgerError>;

    /// Triggers every listed reactor in one transaction.
    async fn trigger_reactors(&self, owner: &Address, ids: &[ReactorId]) -> Result<TxHash, LedgerError>;
}

// ============================================================================
// LEADERBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: u32,
    pub address: Address,
    pub score: u64,
}

/// Sorts by score descending (ties by address), keeps `limit`, assigns ranks.
pub fn rank_scores(mut scores: Vec<(Address, u64)>, limit: usize) -> Vec<LeaderboardEntry> {
    scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scores
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (address, score))| LeaderboardEntry {
            rank: index as u32 + 1,
            address,
            score,
        })
        .collect()
}

/// Builds the leaderboard from the owners of every reactor on the ledger.
///
/// A failed score lookup drops that player rather than the whole board.
pub async fn build_leaderboard<L>(ledger: &L, limit: usize) -> Result<Vec<LeaderboardEntry>, LedgerError>
where
    L: Ledger + ?Sized,
{
    let owners: BTreeSet<Address> = ledger
        .all_reactors()
        .await?
        .into_iter()
        .map(|reactor| reactor.owner)
        .collect();

    let mut scores = Vec::with_capacity(owners.len());
    for owner in owners {
        match ledger.player_score(&owner).await {
            Ok(score) => scores.push((owner, score)),
            Err(err) => debug!(player = %owner, %err, "skipping player without score"),
        }
    }

    Ok(rank_scores(scores, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    struct FixedLedger {
        reactors: Vec<Reactor>,
        scores: HashMap<Address, u64>,
    }

    #[async_trait]
    impl Ledger for FixedLedger {
        async fn all_reactors(&self) -> Result<Vec<Reactor>, LedgerError> {
            Ok(self.reactors.clone())
        }

        async fn player_score(&self, player: &Address) -> Result<u64, LedgerError> {
            self.scores
                .get(player)
                .copied()
                .ok_or_else(|| LedgerError::unavailable("no score"))
        }

        async fn deploy_reactor(
            &self,
            _owner: &Address,
            _cell: Cell,
            _reactor_type: ReactorType,
            _energy: EnergyLevel,
        ) -> Result<TxHash, LedgerError> {
            Err(LedgerError::rejected("read only"))
        }

        async fn trigger_reactors(&self, _owner: &Address, _ids: &[ReactorId]) -> Result<TxHash, LedgerError> {
            Err(LedgerError::rejected("read only"))
        }
    }

    fn reactor(id: ReactorId, owner: Address) -> Reactor {
        Reactor {
            id,
            x: id as u8,
            y: 0,
            energy: EnergyLevel::Low,
            owner,
            is_active: true,
            round: 1,
        }
    }

    #[test]
    fn test_energy_to_reactor_type() {
        assert_eq!(EnergyLevel::Ultra.reactor_type().code(), 0);
        assert_eq!(EnergyLevel::High.reactor_type().code(), 1);
        assert_eq!(EnergyLevel::Medium.reactor_type().code(), 2);
        assert_eq!(EnergyLevel::Low.reactor_type().code(), 3);
        for level in EnergyLevel::ALL {
            assert_eq!(level.reactor_type().energy(), level);
        }
    }

    #[test]
    fn test_energy_serde_uses_value() {
        assert_eq!(serde_json::to_string(&EnergyLevel::Ultra).unwrap(), "10");
        let parsed: EnergyLevel = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, EnergyLevel::Medium);
        assert!(serde_json::from_str::<EnergyLevel>("4").is_err());
    }

    #[test]
    fn test_random_energy_is_seeded() {
        let mut a = ChaCha8Rng::seed_from_u64(9);
        let mut b = ChaCha8Rng::seed_from_u64(9);
        let picks_a: Vec<_> = (0..16).map(|_| EnergyLevel::random(&mut a)).collect();
        let picks_b: Vec<_> = (0..16).map(|_| EnergyLevel::random(&mut b)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_rank_scores_orders_and_limits() {
        let scores = vec![(addr(1), 5), (addr(2), 20), (addr(3), 20), (addr(4), 1)];
        let board = rank_scores(scores, 3);
        assert_eq!(board.len(), 3);
        assert_eq!(board[0].address, addr(2));
        assert_eq!(board[1].address, addr(3));
        assert_eq!(board[2].address, addr(1));
        assert_eq!(board.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_build_leaderboard_dedupes_owners() {
        let ledger = FixedLedger {
            reactors: vec![reactor(1, addr(1)), reactor(2, addr(1)), reactor(3, addr(2)), reactor(4, addr(3))],
            scores: HashMap::from([(addr(1), 7), (addr(2), 11)]),
        };

        let board = build_leaderboard(&ledger, 10).await.unwrap();
        // addr(3) has no score and is skipped
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].address, addr(2));
        assert_eq!(board[0].score, 11);
        assert_eq!(board[1].rank, 2);
    }
}
