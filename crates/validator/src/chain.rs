//! Chain building over a candidate map.
//!
//! A certificate may have multiple valid parents: link certificates and
//! re-issued CSCAs share subject DNs, so the candidate store is
//! `normalized DN → list`. The chain for a certificate is a sum type rather
//! than a flat list, which keeps multi-parent backtracking explicit.
//!
//! Ordering matters: the self-signed termination runs before the visited-set
//! check. A self-signed certificate's issuer DN is already in the visited set
//! by construction and would otherwise be misreported as circular.

use chrono::{DateTime, Utc};
use codec::dn;
use pkd_core::model::Certificate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Maximum number of edges walked from leaf to root.
pub const MAX_CHAIN_DEPTH: usize = 5;

/// Candidate roots and intermediates keyed by normalized subject DN.
pub type CandidateMap = HashMap<String, Vec<Arc<Certificate>>>;

/// Why a chain could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFailure {
    /// Walked past [`MAX_CHAIN_DEPTH`].
    ChainTooDeep,
    /// Issuer DN already visited on this path.
    CircularReference,
    /// No stored CSCA carries the issuer DN.
    CscaNotFound,
    /// Candidates exist but none verifies the signature.
    SignatureInvalid,
}

impl ChainFailure {
    /// Stable failure code.
    pub fn as_str(self) -> &'static str {
        match self {
            ChainFailure::ChainTooDeep => "CHAIN_TOO_DEEP",
            ChainFailure::CircularReference => "CIRCULAR_REFERENCE",
            ChainFailure::CscaNotFound => "CSCA_NOT_FOUND",
            ChainFailure::SignatureInvalid => "SIGNATURE_INVALID",
        }
    }
}

/// Chain of a certificate up to a self-signed root.
#[derive(Debug, Clone)]
pub enum ChainResult {
    /// The certificate itself is a verified self-signed root.
    Terminal(Arc<Certificate>),
    /// The certificate followed by its parent's chain.
    Step(Arc<Certificate>, Box<ChainResult>),
    /// No chain.
    Failure(ChainFailure),
}

impl ChainResult {
    /// Whether a complete chain was built.
    pub fn is_success(&self) -> bool {
        !matches!(self, ChainResult::Failure(_))
    }

    /// Members from this certificate to the root, when successful.
    pub fn members(&self) -> Vec<Arc<Certificate>> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                ChainResult::Terminal(c) => {
                    out.push(c.clone());
                    return out;
                }
                ChainResult::Step(c, tail) => {
                    out.push(c.clone());
                    cur = tail;
                }
                ChainResult::Failure(_) => return Vec::new(),
            }
        }
    }

    /// The terminating root, when successful.
    pub fn root(&self) -> Option<Arc<Certificate>> {
        self.members().last().cloned()
    }

    /// The failure reason, when unsuccessful.
    pub fn failure(&self) -> Option<ChainFailure> {
        match self {
            ChainResult::Failure(f) => Some(*f),
            _ => None,
        }
    }
}

/// Build the chain for `cert` against `candidates`.
pub fn build_chain(
    cert: Arc<Certificate>,
    candidates: &CandidateMap,
    now: DateTime<Utc>,
) -> ChainResult {
    build_inner(cert, candidates, &HashSet::new(), 0, now)
}

fn build_inner(
    cert: Arc<Certificate>,
    candidates: &CandidateMap,
    visited: &HashSet<String>,
    depth: usize,
    now: DateTime<Utc>,
) -> ChainResult {
    if depth > MAX_CHAIN_DEPTH {
        return ChainResult::Failure(ChainFailure::ChainTooDeep);
    }

    // Self-signed termination first; see module docs for why the order is
    // load-bearing. `is_self_signed` was established at parse time as
    // subject ≡ issuer plus a passing self-signature check, so a same-DN
    // certificate that does not verify under its own key falls through here
    // and must find some other parent.
    if cert.is_self_signed {
        return ChainResult::Terminal(cert);
    }

    let issuer = dn::normalize(&cert.issuer_dn);
    if visited.contains(&issuer) {
        return ChainResult::Failure(ChainFailure::CircularReference);
    }

    let mut list = candidates.get(&issuer).cloned().unwrap_or_default();
    if list.is_empty() {
        return ChainResult::Failure(ChainFailure::CscaNotFound);
    }
    // Not-yet-expired candidates first, longer remaining validity next. When
    // several candidates verify, this realizes the later-notAfter preference.
    list.sort_by(|a, b| {
        let a_expired = a.not_after < now;
        let b_expired = b.not_after < now;
        a_expired.cmp(&b_expired).then(b.not_after.cmp(&a.not_after))
    });

    let mut deeper_failure: Option<ChainFailure> = None;
    let mut any_verified = false;
    for candidate in list {
        if candidate.fingerprint == cert.fingerprint {
            continue;
        }
        match codec::x509::verify_signature(&cert.der, &candidate.der) {
            Ok(true) => {}
            _ => continue,
        }
        any_verified = true;
        let mut next_visited = visited.clone();
        next_visited.insert(issuer.clone());
        let tail = build_inner(candidate.clone(), candidates, &next_visited, depth + 1, now);
        if tail.is_success() {
            return ChainResult::Step(cert, Box::new(tail));
        }
        deeper_failure = tail.failure();
    }

    ChainResult::Failure(match (any_verified, deeper_failure) {
        (true, Some(f)) => f,
        (true, None) => ChainFailure::CscaNotFound,
        (false, _) => ChainFailure::SignatureInvalid,
    })
}

/// Assemble the candidate map from stored CSCAs.
pub fn candidate_map(cscas: Vec<Certificate>) -> CandidateMap {
    let mut map: CandidateMap = HashMap::new();
    for csca in cscas {
        map.entry(dn::normalize(&csca.subject_dn)).or_default().push(Arc::new(csca));
    }
    map
}
