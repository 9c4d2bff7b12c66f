//! Zero-knowledge proof stub.
//!
//! The "proof" is a digest of the transition inputs and the commitment is
//! a digest over proof plus inputs; the verifier recomputes the
//! commitment. Self-consistent for every input and broken by any field
//! mutation, which is exactly the contract a real prover would slot into.

use crate::crypto::keccak256_hex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZkProof {
    /// Opaque proof blob (hex).
    pub proof: String,
    pub state_before: String,
    pub state_after: String,
    pub tx_root: String,
    /// keccak over `proof | stateBefore | stateAfter | txRoot`.
    pub commitment: String,
}

pub struct ZkProver;

impl ZkProver {
    pub fn generate(state_before: &str, state_after: &str, tx_root: &str) -> ZkProof {
        let input = format!("{state_before}|{state_after}|{tx_root}");
        let proof = keccak256_hex(input.as_bytes());

        let commit_input = format!("{proof}|{state_before}|{state_after}|{tx_root}");
        let commitment = keccak256_hex(commit_input.as_bytes());

        ZkProof {
            proof,
            state_before: state_before.to_string(),
            state_after: state_after.to_string(),
            tx_root: tx_root.to_string(),
            commitment,
        }
    }
}

pub struct ZkVerifier;

impl ZkVerifier {
    pub fn verify(proof: &ZkProof) -> bool {
        let commit_input = format!(
            "{}|{}|{}|{}",
            proof.proof, proof.state_before, proof.state_after, proof.tx_root
        );
        keccak256_hex(commit_input.as_bytes()) == proof.commitment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_proofs_verify() {
        let p = ZkProver::generate("0xaa", "0xbb", "0xcc");
        assert!(ZkVerifier::verify(&p));

        let empty = ZkProver::generate("", "", "");
        assert!(ZkVerifier::verify(&empty));
    }

    #[test]
    fn any_mutation_breaks_verification() {
        let base = ZkProver::generate("0xaa", "0xbb", "0xcc");

        let mut p = base.clone();
        p.proof.push('0');
        assert!(!ZkVerifier::verify(&p));

        let mut p = base.clone();
        p.state_before = "0xdd".into();
        assert!(!ZkVerifier::verify(&p));

        let mut p = base.clone();
        p.state_after = "0xdd".into();
        assert!(!ZkVerifier::verify(&p));

        let mut p = base.clone();
        p.tx_root = "0xdd".into();
        assert!(!ZkVerifier::verify(&p));

        let mut p = base;
        let flipped = if p.commitment.ends_with('0') { '1' } else { '0' };
        p.commitment.pop();
        p.commitment.push(flipped);
        assert!(!ZkVerifier::verify(&p));
    }
}
