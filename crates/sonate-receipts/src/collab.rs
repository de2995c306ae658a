//! Collaboration ledger: agents, work units, human decisions, manifests.
//!
//! Work units form their own hash chain (one link per unit, starting from the
//! project's genesis hash). Decisions adjudicate work units and may be
//! signed. A manifest aggregates every work unit and decision under one
//! Merkle root.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sonate_core::{
    canonical_hash, canonical_json, genesis_hash, now_millis, verify, verify_proof,
    ChainVerification, HashChain, Keypair, LinkSpec, MerkleProof, MerkleTree, PublicKey,
    Sha256Hash, Signature, SignatureError, UnixMillis,
};

use crate::error::{ReceiptError, Result};

/// Configuration for a collaboration ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Identifier whose genesis hash starts the work chain.
    pub project_id: String,
    /// Reject decisions recorded without a signing key.
    pub require_signed_decisions: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            project_id: "default".to_owned(),
            require_signed_decisions: false,
        }
    }
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// `SHA256("provider:name:version")`.
    pub agent_id: Sha256Hash,
    pub provider: String,
    pub name: String,
    pub version: String,
    pub registered_at: UnixMillis,
}

/// Deterministic agent identifier.
pub fn agent_id(provider: &str, name: &str, version: &str) -> Sha256Hash {
    Sha256Hash::hash(format!("{provider}:{name}:{version}").as_bytes())
}

/// Append-only registry of agents.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    agents: BTreeMap<Sha256Hash, Agent>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Registering the same agent again returns the
    /// existing id and keeps the original record.
    pub fn register(&mut self, provider: &str, name: &str, version: &str) -> Sha256Hash {
        let id = agent_id(provider, name, version);
        self.agents.entry(id).or_insert_with(|| Agent {
            agent_id: id,
            provider: provider.to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
            registered_at: now_millis(),
        });
        id
    }

    pub fn get(&self, id: &Sha256Hash) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &Sha256Hash) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }
}

/// The hashed content of a work unit; this is the link payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WorkContent {
    agent_id: Sha256Hash,
    input_hash: Sha256Hash,
    output_hash: Sha256Hash,
}

/// One agent's input/output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Hash of the work chain link that records this unit.
    pub work_id: Sha256Hash,
    /// Previous unit's `work_id`, or the project genesis hash.
    pub previous_work_id: Sha256Hash,
    pub agent_id: Sha256Hash,
    /// Canonical hash of the input.
    pub input_hash: Sha256Hash,
    /// Canonical hash of the output.
    pub output_hash: Sha256Hash,
    pub timestamp: UnixMillis,
}

impl WorkUnit {
    fn content(&self) -> WorkContent {
        WorkContent {
            agent_id: self.agent_id,
            input_hash: self.input_hash,
            output_hash: self.output_hash,
        }
    }
}

/// A human adjudication of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    NeedsRevision,
}

#[derive(Serialize)]
struct DecisionContent<'a> {
    work_id: &'a Sha256Hash,
    human_did: &'a str,
    verdict: Verdict,
    rationale: &'a str,
    timestamp: UnixMillis,
    public_key: Option<&'a PublicKey>,
}

/// A recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Canonical hash of the decision content.
    pub decision_id: Sha256Hash,
    pub work_id: Sha256Hash,
    pub human_did: String,
    pub verdict: Verdict,
    pub rationale: String,
    pub timestamp: UnixMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Decision {
    fn content(&self) -> DecisionContent<'_> {
        DecisionContent {
            work_id: &self.work_id,
            human_did: &self.human_did,
            verdict: self.verdict,
            rationale: &self.rationale,
            timestamp: self.timestamp,
            public_key: self.public_key.as_ref(),
        }
    }

    /// Whether `decision_id` matches the decision content.
    pub fn verify_id(&self) -> bool {
        matches!(canonical_hash(&self.content()), Ok(id) if id == self.decision_id)
    }

    /// `None` when unsigned, otherwise whether the signature over the
    /// decision id verifies against the embedded public key.
    pub fn verify_signature(&self) -> Option<bool> {
        let signature = self.signature.as_ref()?;
        let key = self.public_key.as_ref()?;
        Some(verify(self.decision_id.as_bytes(), signature, key))
    }
}

/// Aggregate of a ledger at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub project_id: String,
    pub merkle_root: Sha256Hash,
    pub leaf_count: usize,
    pub work_unit_ids: Vec<Sha256Hash>,
    pub decision_ids: Vec<Sha256Hash>,
    pub generated_at: UnixMillis,
}

impl Manifest {
    /// Check an inclusion proof against this manifest's root.
    pub fn verify_inclusion(&self, leaf: &Sha256Hash, proof: &MerkleProof) -> bool {
        verify_proof(leaf, proof, &self.merkle_root)
    }
}

/// A project's collaboration record.
pub struct CollaborationLedger {
    config: LedgerConfig,
    genesis: Sha256Hash,
    directory: AgentDirectory,
    work_chain: HashChain,
    work_units: Vec<WorkUnit>,
    decisions: Vec<Decision>,
}

impl CollaborationLedger {
    /// Create a ledger over an agent directory.
    pub fn new(directory: AgentDirectory, config: LedgerConfig) -> Self {
        let genesis = genesis_hash(&config.project_id);
        Self {
            config,
            genesis,
            directory,
            work_chain: HashChain::new(),
            work_units: Vec::new(),
            decisions: Vec::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The work chain's genesis hash.
    pub fn genesis(&self) -> &Sha256Hash {
        &self.genesis
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// Register an agent in the ledger's directory.
    pub fn register_agent(&mut self, provider: &str, name: &str, version: &str) -> Sha256Hash {
        self.directory.register(provider, name, version)
    }

    pub fn work_units(&self) -> &[WorkUnit] {
        &self.work_units
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn work_unit(&self, work_id: &Sha256Hash) -> Option<&WorkUnit> {
        self.work_units.iter().find(|w| &w.work_id == work_id)
    }

    /// Record a work unit for a registered agent.
    pub fn log_work<I, O>(&mut self, agent_id: &Sha256Hash, input: &I, output: &O) -> Result<WorkUnit>
    where
        I: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        if !self.directory.contains(agent_id) {
            tracing::warn!(agent_id = %agent_id, "rejecting work from unregistered agent");
            return Err(ReceiptError::UnknownAgent(agent_id.to_hex()));
        }

        let content = WorkContent {
            agent_id: *agent_id,
            input_hash: canonical_hash(input)?,
            output_hash: canonical_hash(output)?,
        };
        let previous = self.work_units.last().map_or(self.genesis, |w| w.work_id);
        let link = self
            .work_chain
            .create_link(LinkSpec::after(&previous, canonical_json(&content)?))?;

        let unit = WorkUnit {
            work_id: link.hash,
            previous_work_id: link.previous_hash,
            agent_id: content.agent_id,
            input_hash: content.input_hash,
            output_hash: content.output_hash,
            timestamp: link.timestamp,
        };
        self.work_units.push(unit.clone());
        Ok(unit)
    }

    /// Record a human decision on a work unit, signed if a key is given.
    pub fn record_decision(
        &mut self,
        work_id: &Sha256Hash,
        human_did: &str,
        verdict: Verdict,
        rationale: &str,
        keypair: Option<&Keypair>,
    ) -> Result<Decision> {
        if self.work_unit(work_id).is_none() {
            return Err(ReceiptError::UnknownWorkUnit(work_id.to_hex()));
        }
        if keypair.is_none() && self.config.require_signed_decisions {
            return Err(SignatureError::KeyUnavailable.into());
        }

        let mut decision = Decision {
            decision_id: Sha256Hash::from_bytes([0u8; 32]),
            work_id: *work_id,
            human_did: human_did.to_owned(),
            verdict,
            rationale: rationale.to_owned(),
            timestamp: now_millis(),
            public_key: keypair.map(Keypair::public_key),
            signature: None,
        };
        decision.decision_id = canonical_hash(&decision.content())?;
        decision.signature = keypair.map(|k| k.sign(decision.decision_id.as_bytes()));

        self.decisions.push(decision.clone());
        Ok(decision)
    }

    /// Verify the work chain and that every work unit matches its link.
    pub fn verify_work_chain(&self) -> Result<ChainVerification> {
        let Some(head) = self.work_units.last() else {
            return Ok(ChainVerification {
                valid: true,
                broken_at: None,
                issues: Vec::new(),
                total_links: 0,
                verified_links: 0,
            });
        };

        let mut result = self.work_chain.verify_chain(&head.work_id, &self.genesis)?;
        for unit in &self.work_units {
            let matches = match self.work_chain.get_link(&unit.work_id)? {
                Some(link) => {
                    link.payload.as_ref() == canonical_json(&unit.content())?.as_slice()
                        && link.previous_hash == unit.previous_work_id
                        && link.timestamp == unit.timestamp
                }
                None => false,
            };
            if !matches {
                result.valid = false;
                result.broken_at.get_or_insert(unit.work_id);
                result
                    .issues
                    .push(format!("work unit {} does not match its link", unit.work_id));
            }
        }
        Ok(result)
    }

    fn leaves(&self) -> Vec<Sha256Hash> {
        self.work_units
            .iter()
            .map(|w| w.work_id)
            .chain(self.decisions.iter().map(|d| d.decision_id))
            .collect()
    }

    /// Aggregate all work units and decisions under one Merkle root.
    pub fn manifest(&self) -> Result<Manifest> {
        let tree = MerkleTree::build(self.leaves())?;
        Ok(Manifest {
            project_id: self.config.project_id.clone(),
            merkle_root: tree.root(),
            leaf_count: tree.leaf_count(),
            work_unit_ids: self.work_units.iter().map(|w| w.work_id).collect(),
            decision_ids: self.decisions.iter().map(|d| d.decision_id).collect(),
            generated_at: now_millis(),
        })
    }

    /// Inclusion proof for a work unit or decision id.
    pub fn prove(&self, leaf: &Sha256Hash) -> Result<MerkleProof> {
        Ok(MerkleTree::build(self.leaves())?.proof(leaf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sonate_core::MerkleError;

    fn ledger() -> (CollaborationLedger, Sha256Hash) {
        let mut ledger = CollaborationLedger::new(
            AgentDirectory::new(),
            LedgerConfig {
                project_id: "proj-1".into(),
                ..LedgerConfig::default()
            },
        );
        let agent = ledger.register_agent("openai", "gpt-4", "2024-05");
        (ledger, agent)
    }

    #[test]
    fn test_agent_id_is_deterministic() {
        assert_eq!(
            agent_id("openai", "gpt-4", "2024-05"),
            Sha256Hash::hash(b"openai:gpt-4:2024-05")
        );
        let mut dir = AgentDirectory::new();
        let a = dir.register("p", "n", "v");
        let first = dir.get(&a).unwrap().registered_at;
        let b = dir.register("p", "n", "v");
        assert_eq!(a, b);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&a).unwrap().registered_at, first);
    }

    #[test]
    fn test_unregistered_agent_rejected() {
        let (mut ledger, _) = ledger();
        let stranger = agent_id("x", "y", "z");
        let err = ledger.log_work(&stranger, "in", "out").unwrap_err();
        assert!(matches!(err, ReceiptError::UnknownAgent(_)));
        assert!(ledger.work_units().is_empty());
    }

    #[test]
    fn test_work_units_chain() {
        let (mut ledger, agent) = ledger();
        let a = ledger.log_work(&agent, &json!({"task": 1}), "result one").unwrap();
        let b = ledger.log_work(&agent, &json!({"task": 2}), "result two").unwrap();

        assert_eq!(a.previous_work_id, genesis_hash("proj-1"));
        assert_eq!(b.previous_work_id, a.work_id);
        assert_eq!(a.input_hash, canonical_hash(&json!({"task": 1})).unwrap());

        let result = ledger.verify_work_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.verified_links, 2);
    }

    #[test]
    fn test_tampered_work_unit_detected() {
        let (mut ledger, agent) = ledger();
        ledger.log_work(&agent, "in", "out").unwrap();
        ledger.log_work(&agent, "in2", "out2").unwrap();

        ledger.work_units[0].output_hash = Sha256Hash::hash(b"forged");
        let result = ledger.verify_work_chain().unwrap();
        assert!(!result.valid);
        assert_eq!(result.broken_at, Some(ledger.work_units[0].work_id));
    }

    #[test]
    fn test_decisions() {
        let (mut ledger, agent) = ledger();
        let work = ledger.log_work(&agent, "in", "out").unwrap();
        let key = Keypair::from_seed(&[5u8; 32]);

        let signed = ledger
            .record_decision(&work.work_id, "did:human:1", Verdict::Approved, "fine", Some(&key))
            .unwrap();
        assert!(signed.verify_id());
        assert_eq!(signed.verify_signature(), Some(true));

        let unsigned = ledger
            .record_decision(&work.work_id, "did:human:2", Verdict::NeedsRevision, "redo", None)
            .unwrap();
        assert!(unsigned.verify_id());
        assert_eq!(unsigned.verify_signature(), None);

        let mut forged = signed.clone();
        forged.rationale = "changed".into();
        assert!(!forged.verify_id());
    }

    #[test]
    fn test_decision_on_unknown_work_rejected() {
        let (mut ledger, _) = ledger();
        let err = ledger
            .record_decision(&Sha256Hash::hash(b"none"), "h", Verdict::Rejected, "", None)
            .unwrap_err();
        assert!(matches!(err, ReceiptError::UnknownWorkUnit(_)));
    }

    #[test]
    fn test_signed_decisions_can_be_required() {
        let mut ledger = CollaborationLedger::new(
            AgentDirectory::new(),
            LedgerConfig {
                require_signed_decisions: true,
                ..LedgerConfig::default()
            },
        );
        let agent = ledger.register_agent("p", "n", "v");
        let work = ledger.log_work(&agent, "i", "o").unwrap();
        let err = ledger
            .record_decision(&work.work_id, "h", Verdict::Approved, "", None)
            .unwrap_err();
        assert!(matches!(err, ReceiptError::Signature(SignatureError::KeyUnavailable)));
    }

    #[test]
    fn test_manifest_and_proofs() {
        let (mut ledger, agent) = ledger();
        assert!(matches!(
            ledger.manifest(),
            Err(ReceiptError::Merkle(MerkleError::EmptyLeafSet))
        ));

        let w1 = ledger.log_work(&agent, "a", "b").unwrap();
        let w2 = ledger.log_work(&agent, "c", "d").unwrap();
        let d1 = ledger
            .record_decision(&w2.work_id, "h", Verdict::Approved, "ok", None)
            .unwrap();

        let manifest = ledger.manifest().unwrap();
        assert_eq!(manifest.leaf_count, 3);
        assert_eq!(manifest.work_unit_ids, vec![w1.work_id, w2.work_id]);
        assert_eq!(manifest.decision_ids, vec![d1.decision_id]);

        for leaf in [w1.work_id, w2.work_id, d1.decision_id] {
            let proof = ledger.prove(&leaf).unwrap();
            assert!(manifest.verify_inclusion(&leaf, &proof));
        }
        assert!(matches!(
            ledger.prove(&Sha256Hash::hash(b"absent")),
            Err(ReceiptError::Merkle(MerkleError::LeafNotFound(_)))
        ));
    }
}
