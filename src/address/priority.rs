// Copyright 2023 litep2p developers
// Copyright 2026 reachnet developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Stateless address scoring.

use std::time::{Duration, Instant};

/// Base address type, driving the base score in the priority formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Lan,
    NatMapped,
    Relay,
}

impl AddressType {
    pub fn base_score(self) -> i64 {
        match self {
            AddressType::Public => 80,
            AddressType::Lan => 70,
            AddressType::NatMapped => 60,
            AddressType::Relay => 40,
        }
    }
}

/// Dial usability state of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressState {
    Unknown,
    Pending,
    Available,
    Degraded,
    Unreachable,
    Invalid,
}

impl AddressState {
    /// `pending`, `unreachable`, and `invalid` are not usable as dial candidates.
    pub fn is_usable(self) -> bool {
        matches!(self, AddressState::Unknown | AddressState::Available | AddressState::Degraded)
    }
}

/// Rolling dial statistics for one address.
#[derive(Debug, Clone)]
pub struct AddressStats {
    pub success_count: u64,
    pub fail_count: u64,
    pub consecutive_fails: u32,
    /// Exponential moving average RTT: `0.7 * old + 0.3 * new`.
    pub avg_rtt: Option<Duration>,
    pub last_success: Option<Instant>,
    pub last_fail: Option<Instant>,
}

impl Default for AddressStats {
    fn default() -> Self {
        Self {
            success_count: 0,
            fail_count: 0,
            consecutive_fails: 0,
            avg_rtt: None,
            last_success: None,
            last_fail: None,
        }
    }
}

impl AddressStats {
    pub fn record_success(&mut self, rtt: Duration, now: Instant) {
        self.success_count += 1;
        self.consecutive_fails = 0;
        self.last_success = Some(now);
        self.avg_rtt = Some(match self.avg_rtt {
            Some(old) => old.mul_f64(0.7) + rtt.mul_f64(0.3),
            None => rtt,
        });
    }

    pub fn record_fail(&mut self, now: Instant) {
        self.fail_count += 1;
        self.consecutive_fails += 1;
        self.last_fail = Some(now);
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.fail_count;
        if total == 0 {
            return 0.0;
        }
        self.success_count as f64 / total as f64
    }

    fn rtt_penalty(&self) -> i64 {
        match self.avg_rtt {
            None => 0,
            Some(rtt) if rtt < Duration::from_millis(50) => 0,
            Some(rtt) if rtt < Duration::from_millis(100) => 5,
            Some(rtt) if rtt < Duration::from_millis(200) => 10,
            Some(_) => 20,
        }
    }
}

/// `priority = base + min(success_rate * 20, 20) - min(consecutive_fails * 10, 50) - rtt_penalty`.
/// An address whose state is not usable has an effective priority of zero.
pub fn score(address_type: AddressType, state: AddressState, stats: &AddressStats) -> i64 {
    if !state.is_usable() {
        return 0;
    }

    let base = address_type.base_score();
    let success_bonus = ((stats.success_rate() * 20.0) as i64).min(20);
    let fail_penalty = ((stats.consecutive_fails as i64) * 10).min(50);
    let rtt_penalty = stats.rtt_penalty();

    base + success_bonus - fail_penalty - rtt_penalty
}

/// One scorable candidate: enough context to rank and to pick the best.
pub trait Scored {
    fn address_type(&self) -> AddressType;
    fn state(&self) -> AddressState;
    fn stats(&self) -> &AddressStats;
    fn last_success(&self) -> Option<Instant>;
}

/// Sort candidates by descending score, breaking ties by descending
/// `last_success`. The sort is stable: equal-score, equal-last-success
/// entries keep their relative input order.
pub fn sort_by_priority<T: Scored>(candidates: &mut [T]) {
    candidates.sort_by(|a, b| {
        let score_a = score(a.address_type(), a.state(), a.stats());
        let score_b = score(b.address_type(), b.state(), b.stats());

        score_b.cmp(&score_a).then_with(|| b.last_success().cmp(&a.last_success()))
    });
}

/// Return the first usable candidate after priority sorting, or `None` if
/// every candidate is expired or unusable. Does not mutate `candidates`;
/// callers that want a stable cache should sort once and reuse it.
pub fn select_best<T: Scored + Clone>(candidates: &[T]) -> Option<T> {
    let mut sorted: Vec<T> = candidates.to_vec();
    sort_by_priority(&mut sorted);
    sorted.into_iter().find(|c| c.state().is_usable())
}
