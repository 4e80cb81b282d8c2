//! Ballot boxes
//!
//! Every tracked candidate lives in exactly one box:
//!
//! ```text
//!   first ballot ──► Waiting ──(INIT YES)──► Voting ──(ALLCONFIRM / NO / EXP)──► Reserved
//!                       │                                                         │
//!                       └──(closed early, or no payload before expiry)────────────┤
//!                                                                                 ▼
//!                      Voting ◄──(fresh INIT with payload after a NO close)── Reserved ──(expired, unreferenced)──► removed
//! ```
//!
//! The tally and the box membership sit behind one lock so a candidate can
//! never be observed in two boxes at once.

use parking_lot::Mutex;
use shared_types::{now_millis, Address, Hash};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    Ballot, BallotState, Candidate, CandidateRef, ConsensusResult, Round, RunningRound,
    VotingResult, VotingStateStaging, VotingThresholdPolicy,
};

/// The three lifecycle boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    /// Seen, INIT not yet agreed.
    Waiting,
    /// INIT agreed, still voting.
    Voting,
    /// Closed. Kept until expired and unreferenced.
    Reserved,
}

impl BoxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxKind::Waiting => "waiting",
            BoxKind::Voting => "voting",
            BoxKind::Reserved => "reserved",
        }
    }
}

/// What adding one ballot changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// The ballot created the VotingResult.
    pub is_new: bool,
    /// The ballot supplied the candidate payload.
    pub payload_attached: bool,
    /// A rejected candidate was reopened and moved back to Voting.
    pub promoted: bool,
}

/// Candidate counts per box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxCounts {
    pub waiting: usize,
    pub voting: usize,
    pub reserved: usize,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Results dropped from Reserved.
    pub removed: Vec<Hash>,
    /// Stalled results closed and moved to Reserved: Waiting entries that
    /// never got a payload, and transaction candidates left in Waiting or
    /// Voting past retention.
    pub demoted: Vec<Hash>,
}

#[derive(Debug, Clone, Copy)]
struct Membership {
    kind: BoxKind,
    /// When the candidate entered its current box (millis).
    since: u64,
}

#[derive(Default)]
struct Inner {
    results: HashMap<Hash, VotingResult>,
    boxes: HashMap<Hash, Membership>,
    running_rounds: HashMap<Hash, RunningRound>,
}

impl Inner {
    fn move_to(&mut self, hash: Hash, kind: BoxKind) {
        self.boxes.insert(
            hash,
            Membership {
                kind,
                since: now_millis(),
            },
        );
    }

    fn kind(&self, hash: &Hash) -> Option<BoxKind> {
        self.boxes.get(hash).map(|m| m.kind)
    }
}

/// Owner of every VotingResult on this node.
#[derive(Default)]
pub struct BallotBoxes {
    inner: Mutex<Inner>,
}

impl BallotBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `ballot` into its VotingResult, creating it in Waiting if needed.
    ///
    /// A NO-closed candidate in Reserved is reopened when a fresh INIT
    /// ballot carrying the payload arrives, signed at or after the close.
    pub fn add_ballot(&self, ballot: &Ballot) -> ConsensusResult<AddOutcome> {
        let hash = ballot.candidate_hash();
        let mut inner = self.inner.lock();
        let mut outcome = AddOutcome::default();

        let reopen = match (inner.results.get(&hash), inner.kind(&hash)) {
            (Some(result), Some(BoxKind::Reserved)) => {
                result.is_rejected()
                    && ballot.state() == BallotState::Init
                    && ballot.data.is_some()
                    && result
                        .closed_at()
                        .is_some_and(|closed| ballot.body.confirmed >= closed)
            }
            _ => false,
        };

        match inner.results.get_mut(&hash) {
            Some(result) => {
                if reopen {
                    result.reopen();
                    outcome.promoted = true;
                }
                outcome.payload_attached = result.add(ballot)?;
            }
            None => {
                let result = VotingResult::new(ballot)?;
                outcome.is_new = true;
                outcome.payload_attached = result.data().is_some();
                inner.results.insert(hash, result);
                inner.move_to(hash, BoxKind::Waiting);
            }
        }
        if outcome.promoted {
            inner.move_to(hash, BoxKind::Voting);
        }

        if let CandidateRef::Round(round) = ballot.subject() {
            let running = inner
                .running_rounds
                .entry(hash)
                .or_insert_with(|| RunningRound::new(*round, ballot.proposer()));
            running.record(ballot.state(), ballot.node(), ballot.vote());
            if let Some(Candidate::Proposal(proposal)) = &ballot.data {
                if running.transactions.is_empty() {
                    running.proposer = proposal.proposer;
                    running.transactions = proposal.transactions.clone();
                }
            }
        }
        Ok(outcome)
    }

    /// Settle the candidate if its votes allow, and move it between boxes.
    pub fn make_result(
        &self,
        hash: &Hash,
        policy: &VotingThresholdPolicy,
    ) -> ConsensusResult<Option<VotingStateStaging>> {
        let mut inner = self.inner.lock();
        let Some(result) = inner.results.get_mut(hash) else {
            return Ok(None);
        };
        let Some((state, vote)) = result.make_result(policy) else {
            return Ok(None);
        };
        let staging = result.change_state(vote, state)?;
        let closed = result.is_closed();

        if closed {
            inner.move_to(*hash, BoxKind::Reserved);
        } else if inner.kind(hash) == Some(BoxKind::Waiting) {
            inner.move_to(*hash, BoxKind::Voting);
        }
        Ok(Some(staging))
    }

    pub fn has_message(&self, hash: &Hash) -> bool {
        self.inner.lock().results.contains_key(hash)
    }

    /// Tracked, and not a rejected candidate that may be reintroduced.
    pub fn is_live(&self, hash: &Hash) -> bool {
        let inner = self.inner.lock();
        match inner.results.get(hash) {
            Some(result) => !(result.is_rejected() && inner.kind(hash) == Some(BoxKind::Reserved)),
            None => false,
        }
    }

    pub fn is_voted(&self, hash: &Hash, node: &Address, state: BallotState) -> bool {
        self.inner
            .lock()
            .results
            .get(hash)
            .is_some_and(|r| r.is_voted(node, state))
    }

    pub fn box_of(&self, hash: &Hash) -> Option<BoxKind> {
        self.inner.lock().kind(hash)
    }

    /// Tracked and not yet decided.
    pub fn is_open(&self, hash: &Hash) -> bool {
        self.inner
            .lock()
            .results
            .get(hash)
            .is_some_and(|r| !r.is_closed())
    }

    pub fn result_state(&self, hash: &Hash) -> Option<BallotState> {
        self.inner.lock().results.get(hash).map(|r| r.state())
    }

    pub fn candidate_data(&self, hash: &Hash) -> Option<Candidate> {
        self.inner
            .lock()
            .results
            .get(hash)
            .and_then(|r| r.data().cloned())
    }

    /// Copy of the VotingResult, for inspection.
    pub fn snapshot(&self, hash: &Hash) -> Option<VotingResult> {
        self.inner.lock().results.get(hash).cloned()
    }

    pub fn running_round(&self, round: &Round) -> Option<RunningRound> {
        self.inner.lock().running_rounds.get(&round.hash()).cloned()
    }

    /// Close every open round candidate from a height below `current`, and
    /// drop their running-round bookkeeping. Earlier rounds at the current
    /// height stay open so late votes can still settle them. Returns how
    /// many were closed.
    pub fn close_stale_rounds(&self, current: &Round) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<Hash> = inner
            .results
            .iter()
            .filter(|(_, r)| {
                r.subject()
                    .round()
                    .is_some_and(|round| round.block_height < current.block_height)
            })
            .map(|(h, _)| *h)
            .collect();

        let mut closed = 0;
        for hash in stale {
            if let Some(result) = inner.results.get_mut(&hash) {
                if !result.is_closed() {
                    result.abandon();
                    closed += 1;
                }
            }
            if inner.kind(&hash) != Some(BoxKind::Reserved) {
                inner.move_to(hash, BoxKind::Reserved);
            }
        }
        inner
            .running_rounds
            .retain(|_, running| running.round.block_height >= current.block_height);
        closed
    }

    /// Expire old candidates.
    ///
    /// Reserved entries older than `retention` are removed unless
    /// `is_referenced` (or a running round) still needs them. Waiting
    /// entries that never received a payload, and transaction candidates
    /// stuck in Waiting or Voting, are closed and moved to Reserved once
    /// they outlive `retention`. Round candidates with a payload are left
    /// to the round timers.
    pub fn sweep(
        &self,
        now: u64,
        retention: Duration,
        is_referenced: impl Fn(&Hash) -> bool,
    ) -> SweepReport {
        let retention = retention.as_millis() as u64;
        let mut inner = self.inner.lock();
        let mut report = SweepReport::default();

        let expired: Vec<(Hash, BoxKind)> = inner
            .boxes
            .iter()
            .filter(|(_, m)| m.since.saturating_add(retention) <= now)
            .map(|(h, m)| (*h, m.kind))
            .collect();

        for (hash, kind) in expired {
            match kind {
                BoxKind::Reserved => {
                    let in_round = inner.running_rounds.values().any(|r| r.references(&hash));
                    if in_round || is_referenced(&hash) {
                        continue;
                    }
                    inner.results.remove(&hash);
                    inner.boxes.remove(&hash);
                    inner.running_rounds.remove(&hash);
                    report.removed.push(hash);
                }
                BoxKind::Waiting | BoxKind::Voting => {
                    let Some(result) = inner.results.get_mut(&hash) else {
                        continue;
                    };
                    let stalled = !result.subject().is_round()
                        || (kind == BoxKind::Waiting && result.data().is_none());
                    if stalled {
                        result.abandon();
                        inner.move_to(hash, BoxKind::Reserved);
                        report.demoted.push(hash);
                    }
                }
            }
        }
        report
    }

    pub fn counts(&self) -> BoxCounts {
        let inner = self.inner.lock();
        inner
            .boxes
            .values()
            .fold(BoxCounts::default(), |mut counts, m| {
                match m.kind {
                    BoxKind::Waiting => counts.waiting += 1,
                    BoxKind::Voting => counts.voting += 1,
                    BoxKind::Reserved => counts.reserved += 1,
                }
                counts
            })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Proposal, VotingHole};
    use proptest::prelude::*;
    use shared_types::{KeyPair, Operation, Transaction, TransactionBody};

    const NET: &[u8] = b"test-net";

    fn keys(n: u8) -> Vec<KeyPair> {
        (0..n).map(|i| KeyPair::from_seed([i + 1; 32])).collect()
    }

    fn policy(n: usize) -> VotingThresholdPolicy {
        let mut p = VotingThresholdPolicy::new(66, 66, 66).unwrap();
        p.set_validators(n);
        p
    }

    fn tx(key: &KeyPair) -> Transaction {
        let body = TransactionBody {
            source: key.address(),
            fee: 1,
            checkpoint: [0u8; 32],
            operations: vec![Operation::Payment {
                target: Address([7u8; 32]),
                amount: 5,
            }],
            created: 1,
        };
        Transaction::new(key, NET, body).unwrap()
    }

    fn payment(key: &KeyPair, amount: u64) -> Transaction {
        let body = TransactionBody {
            source: key.address(),
            fee: 1,
            checkpoint: [0u8; 32],
            operations: vec![Operation::Payment {
                target: Address([7u8; 32]),
                amount,
            }],
            created: 1,
        };
        Transaction::new(key, NET, body).unwrap()
    }

    fn tx_ballot(
        key: &KeyPair,
        tx: &Transaction,
        state: BallotState,
        vote: VotingHole,
        with_data: bool,
    ) -> Ballot {
        let data = with_data.then(|| Candidate::Transaction(tx.clone()));
        Ballot::sign(
            key,
            NET,
            CandidateRef::Transaction(tx.hash),
            key.address(),
            state,
            vote,
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_first_ballot_lands_in_waiting() {
        let k = keys(3);
        let tx = tx(&k[0]);
        let boxes = BallotBoxes::new();
        let outcome = boxes
            .add_ballot(&tx_ballot(&k[0], &tx, BallotState::Init, VotingHole::Yes, true))
            .unwrap();
        assert!(outcome.is_new);
        assert!(outcome.payload_attached);
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Waiting));
        assert!(boxes.has_message(&tx.hash));
        assert!(boxes.is_voted(&tx.hash, &k[0].address(), BallotState::Init));
    }

    #[test]
    fn test_lifecycle_waiting_voting_reserved() {
        let k = keys(3);
        let p = policy(3);
        let tx = tx(&k[0]);
        let boxes = BallotBoxes::new();

        for (i, key) in k.iter().take(2).enumerate() {
            boxes
                .add_ballot(&tx_ballot(key, &tx, BallotState::Init, VotingHole::Yes, i == 0))
                .unwrap();
        }
        let staging = boxes.make_result(&tx.hash, &p).unwrap().unwrap();
        assert_eq!(staging.state, BallotState::Sign);
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Voting));

        for state in [BallotState::Sign, BallotState::Accept] {
            for key in k.iter().take(2) {
                boxes
                    .add_ballot(&tx_ballot(key, &tx, state, VotingHole::Yes, false))
                    .unwrap();
            }
            boxes.make_result(&tx.hash, &p).unwrap().unwrap();
        }
        assert_eq!(boxes.result_state(&tx.hash), Some(BallotState::AllConfirm));
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Reserved));
        assert_eq!(
            boxes.counts(),
            BoxCounts {
                waiting: 0,
                voting: 0,
                reserved: 1
            }
        );
    }

    #[test]
    fn test_rejected_candidate_is_reopened_by_fresh_init() {
        let k = keys(3);
        let p = policy(3);
        let tx = tx(&k[0]);
        let boxes = BallotBoxes::new();

        boxes
            .add_ballot(&tx_ballot(&k[0], &tx, BallotState::Init, VotingHole::No, true))
            .unwrap();
        boxes
            .add_ballot(&tx_ballot(&k[1], &tx, BallotState::Init, VotingHole::No, false))
            .unwrap();
        let staging = boxes.make_result(&tx.hash, &p).unwrap().unwrap();
        assert!(staging.is_closed());
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Reserved));
        assert!(!boxes.is_live(&tx.hash));

        // A vote without payload does not reopen.
        let outcome = boxes
            .add_ballot(&tx_ballot(&k[2], &tx, BallotState::Init, VotingHole::Yes, false))
            .unwrap();
        assert!(!outcome.promoted);

        let outcome = boxes
            .add_ballot(&tx_ballot(&k[2], &tx, BallotState::Init, VotingHole::Yes, true))
            .unwrap();
        assert!(outcome.promoted);
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Voting));
        assert_eq!(boxes.snapshot(&tx.hash).unwrap().epoch(), 1);
        assert!(boxes.is_live(&tx.hash));
    }

    #[test]
    fn test_round_ballots_track_running_round() {
        let k = keys(3);
        let round = Round::first(1, [1u8; 32], 0);
        let proposal = Proposal {
            round,
            proposer: k[0].address(),
            transactions: vec![[9u8; 32]],
            proposed: 0,
        };
        let boxes = BallotBoxes::new();
        let ballot = Ballot::sign(
            &k[0],
            NET,
            CandidateRef::Round(round),
            k[0].address(),
            BallotState::Init,
            VotingHole::Yes,
            Some(Candidate::Proposal(proposal)),
        )
        .unwrap();
        boxes.add_ballot(&ballot).unwrap();

        let running = boxes.running_round(&round).unwrap();
        assert_eq!(running.proposer, k[0].address());
        assert!(running.references(&[9u8; 32]));
        assert_eq!(
            running.voted[&BallotState::Init][&k[0].address()],
            VotingHole::Yes
        );

        // A later round at the same height leaves it open.
        assert_eq!(boxes.close_stale_rounds(&round.increased()), 0);
        assert!(boxes.is_open(&round.hash()));
        assert!(boxes.running_round(&round).is_some());
        assert_eq!(boxes.box_of(&round.hash()), Some(BoxKind::Waiting));

        assert_eq!(boxes.close_stale_rounds(&Round::first(2, [2u8; 32], 0)), 1);
        assert!(!boxes.is_open(&round.hash()));
        assert!(boxes.running_round(&round).is_none());
        assert_eq!(boxes.box_of(&round.hash()), Some(BoxKind::Reserved));
    }

    #[test]
    fn test_sweep_removes_unreferenced_reserved() {
        let k = keys(3);
        let p = policy(3);
        let boxes = BallotBoxes::new();
        let keep = tx(&k[0]);
        let drop = tx(&k[1]);

        for t in [&keep, &drop] {
            for (i, key) in k.iter().take(2).enumerate() {
                boxes
                    .add_ballot(&tx_ballot(key, t, BallotState::Init, VotingHole::No, i == 0))
                    .unwrap();
            }
            boxes.make_result(&t.hash, &p).unwrap();
        }

        let later = now_millis() + 10_000;
        let report = boxes.sweep(later, Duration::from_secs(1), |h| *h == keep.hash);
        assert_eq!(report.removed, vec![drop.hash]);
        assert!(boxes.has_message(&keep.hash));
        assert!(!boxes.has_message(&drop.hash));

        // Not yet expired: nothing happens.
        let report = boxes.sweep(now_millis(), Duration::from_secs(60), |_| false);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_sweep_demotes_waiting_without_payload() {
        let k = keys(3);
        let tx = tx(&k[0]);
        let boxes = BallotBoxes::new();
        boxes
            .add_ballot(&tx_ballot(&k[1], &tx, BallotState::Sign, VotingHole::Yes, false))
            .unwrap();

        let report = boxes.sweep(now_millis() + 10_000, Duration::from_secs(1), |_| false);
        assert_eq!(report.demoted, vec![tx.hash]);
        assert_eq!(boxes.box_of(&tx.hash), Some(BoxKind::Reserved));
    }

    #[test]
    fn test_sweep_abandons_stalled_transactions() {
        let k = keys(3);
        let p = policy(3);
        let boxes = BallotBoxes::new();

        // INIT agreed, then nothing more.
        let voting = payment(&k[0], 1);
        for (i, key) in k.iter().take(2).enumerate() {
            boxes
                .add_ballot(&tx_ballot(key, &voting, BallotState::Init, VotingHole::Yes, i == 0))
                .unwrap();
        }
        boxes.make_result(&voting.hash, &p).unwrap();
        assert_eq!(boxes.box_of(&voting.hash), Some(BoxKind::Voting));

        // Payload known, INIT never agreed.
        let waiting = payment(&k[1], 2);
        boxes
            .add_ballot(&tx_ballot(&k[1], &waiting, BallotState::Init, VotingHole::Yes, true))
            .unwrap();
        assert_eq!(boxes.box_of(&waiting.hash), Some(BoxKind::Waiting));

        // Nothing happens inside retention.
        let report = boxes.sweep(now_millis(), Duration::from_secs(60), |_| false);
        assert_eq!(report, SweepReport::default());

        let later = now_millis() + 3_600_000;
        let mut report = boxes.sweep(later, Duration::from_secs(1), |_| true);
        report.demoted.sort();
        let mut expected = vec![voting.hash, waiting.hash];
        expected.sort();
        assert_eq!(report.demoted, expected);
        assert!(report.removed.is_empty());
        for hash in &expected {
            assert_eq!(boxes.box_of(hash), Some(BoxKind::Reserved));
            assert!(!boxes.is_open(hash));
        }

        // Once nothing references them they go on the next pass.
        let report = boxes.sweep(later + 3_600_000, Duration::from_secs(1), |_| false);
        assert_eq!(report.removed.len(), 2);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_sweep_leaves_round_candidates_with_payload() {
        let k = keys(3);
        let round = Round::first(1, [1u8; 32], 0);
        let proposal = Proposal {
            round,
            proposer: k[0].address(),
            transactions: vec![],
            proposed: 0,
        };
        let boxes = BallotBoxes::new();
        let ballot = Ballot::sign(
            &k[0],
            NET,
            CandidateRef::Round(round),
            k[0].address(),
            BallotState::Init,
            VotingHole::Yes,
            Some(Candidate::Proposal(proposal)),
        )
        .unwrap();
        boxes.add_ballot(&ballot).unwrap();

        let report = boxes.sweep(now_millis() + 3_600_000, Duration::from_secs(1), |_| false);
        assert!(report.demoted.is_empty());
        assert!(boxes.is_open(&round.hash()));
    }

    // =========================================================================
    // DELIVERY ORDER
    // =========================================================================

    /// INIT/SIGN/ACCEPT ballots from every key. Keys listed in `sign_no`
    /// vote NO at SIGN. Without `accept` there are no ACCEPT ballots and no
    /// payload, so a late INIT can never reopen the rejected candidate.
    fn ballot_set(k: &[KeyPair], tx: &Transaction, sign_no: &[usize], accept: bool) -> Vec<Ballot> {
        let mut states = vec![BallotState::Init, BallotState::Sign];
        if accept {
            states.push(BallotState::Accept);
        }
        let mut ballots = Vec::new();
        for state in states {
            for (i, key) in k.iter().enumerate() {
                let vote = if state == BallotState::Sign && sign_no.contains(&i) {
                    VotingHole::No
                } else {
                    VotingHole::Yes
                };
                let with_data = accept && state == BallotState::Init && i == 0;
                ballots.push(tx_ballot(key, tx, state, vote, with_data));
            }
        }
        ballots
    }

    /// Three agreed and three rejected candidates over four validators.
    fn mixed_ballots(k: &[KeyPair]) -> (Vec<Hash>, Vec<Ballot>) {
        let mut hashes = Vec::new();
        let mut ballots = Vec::new();
        for amount in 1..=6u64 {
            let tx = payment(&k[0], amount);
            let agreed = amount % 2 == 0;
            let set = if agreed {
                ballot_set(k, &tx, &[3], true)
            } else {
                ballot_set(k, &tx, &[2, 3], false)
            };
            hashes.push(tx.hash);
            ballots.extend(set);
        }
        (hashes, ballots)
    }

    fn deliver(boxes: &BallotBoxes, p: &VotingThresholdPolicy, ballot: &Ballot) {
        boxes.add_ballot(ballot).unwrap();
        while boxes.make_result(&ballot.candidate_hash(), p).unwrap().is_some() {}
    }

    /// What the node decided about `hash`, independent of the path taken.
    fn decision(boxes: &BallotBoxes, hash: &Hash) -> (bool, bool, Option<VotingHole>, Option<BoxKind>) {
        let result = boxes.snapshot(hash).unwrap();
        (
            result.is_closed(),
            result.is_rejected(),
            result.latest_staging().map(|s| s.vote),
            boxes.box_of(hash),
        )
    }

    fn assert_one_box_each(boxes: &BallotBoxes, hashes: &[Hash]) {
        let counts = boxes.counts();
        assert_eq!(counts.waiting + counts.voting + counts.reserved, boxes.len());
        assert_eq!(boxes.len(), hashes.len());
        for hash in hashes {
            assert!(boxes.box_of(hash).is_some());
        }
    }

    #[test]
    fn test_concurrent_delivery_matches_sequential() {
        let k = keys(4);
        let p = policy(4);
        let (hashes, ballots) = mixed_ballots(&k);

        let sequential = BallotBoxes::new();
        for ballot in &ballots {
            deliver(&sequential, &p, ballot);
        }
        let expected: Vec<_> = hashes.iter().map(|h| decision(&sequential, h)).collect();
        for (i, (closed, rejected, vote, kind)) in expected.iter().enumerate() {
            assert!(*closed);
            assert_eq!(*kind, Some(BoxKind::Reserved));
            let agreed = i % 2 == 1;
            assert_eq!(*rejected, !agreed);
            assert_eq!(*vote, Some(if agreed { VotingHole::Yes } else { VotingHole::No }));
        }

        const THREADS: usize = 4;
        for pass in 0..8 {
            let boxes = BallotBoxes::new();
            std::thread::scope(|scope| {
                for t in 0..THREADS {
                    let (boxes, p, ballots) = (&boxes, &p, &ballots);
                    scope.spawn(move || {
                        let mut share: Vec<&Ballot> = ballots
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| (i + pass) % THREADS == t)
                            .map(|(_, b)| b)
                            .collect();
                        if (t + pass) % 2 == 0 {
                            share.reverse();
                        }
                        for ballot in share {
                            deliver(boxes, p, ballot);
                        }
                    });
                }
            });

            assert_one_box_each(&boxes, &hashes);
            let got: Vec<_> = hashes.iter().map(|h| decision(&boxes, h)).collect();
            assert_eq!(got, expected, "pass {pass}");
            assert_eq!(boxes.counts(), sequential.counts());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_decision_ignores_delivery_order(
            order in Just(mixed_ballots(&keys(4)).1).prop_shuffle()
        ) {
            let p = policy(4);
            let (hashes, ballots) = mixed_ballots(&keys(4));

            let reference = BallotBoxes::new();
            for ballot in &ballots {
                deliver(&reference, &p, ballot);
            }
            let shuffled = BallotBoxes::new();
            for ballot in &order {
                deliver(&shuffled, &p, ballot);
            }

            assert_one_box_each(&shuffled, &hashes);
            for hash in &hashes {
                prop_assert_eq!(decision(&shuffled, hash), decision(&reference, hash));
            }
        }
    }
}
