//! ABCI state machine
//!
//! `Idle -> BeginBlock -> DeliverTx* -> EndBlock -> Commit -> Idle`.
//! `Info` and `Query` are accepted in every phase and never move it.
//! A rejected request leaves the phase where it was.

use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::abci::{query_code, tx_code, AbciRequest, AbciResponse};
use crate::config::BridgeConfig;
use crate::consensus::{ConsensusEngine, ConsensusError};
use crate::node::{Blockchain, ChainError, GenesisAccount, GenesisValidator};
use crate::validation::Transaction;

/// Protocol errors
#[derive(Debug, Error)]
pub enum AbciError {
    #[error("{request} not allowed while {phase}")]
    OutOfOrder { request: &'static str, phase: Phase },
    #[error("chain already initialized")]
    AlreadyInitialized,
    #[error("unexpected height: expected {expected}, got {got}")]
    UnexpectedHeight { expected: u64, got: u64 },
    #[error("proposer address must be non-empty")]
    EmptyProposer,
    #[error("proposer {0} is not an active validator")]
    UnknownProposer(String),
    #[error("genesis account address must be non-empty")]
    EmptyGenesisAccount,
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Where the application is in the block cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InBlock { height: u64, proposer: String },
    Ended { height: u64 },
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::InBlock { height, .. } => write!(f, "in block {height}"),
            Phase::Ended { height } => write!(f, "block {height} ended"),
        }
    }
}

/// A chain instance driven by ABCI requests
#[derive(Debug)]
pub struct LedgerApp {
    chain: Blockchain,
    validators: ConsensusEngine,
    phase: Phase,
    initialized: bool,
}

impl LedgerApp {
    pub fn new(chain: Blockchain, validators: ConsensusEngine) -> Self {
        Self { chain, validators, phase: Phase::Idle, initialized: false }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let validators = match config.consensus.seed {
            Some(seed) => ConsensusEngine::with_seed(config.consensus.min_validator_stake, seed),
            None => ConsensusEngine::new(config.consensus.min_validator_stake),
        };
        Self::new(Blockchain::new(config.chain.clone()), validators)
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Blockchain {
        &mut self.chain
    }

    pub fn validators(&self) -> &ConsensusEngine {
        &self.validators
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Handle any request
    pub fn process(&mut self, request: AbciRequest) -> Result<AbciResponse, AbciError> {
        let name = request.name();
        let result = match request {
            AbciRequest::Info | AbciRequest::Query { .. } => self.respond(&request),
            AbciRequest::InitChain { validators, genesis_accounts } => {
                self.init_chain(validators, genesis_accounts)
            }
            AbciRequest::BeginBlock { height, proposer } => self.begin_block(height, proposer),
            AbciRequest::DeliverTx { tx_data } => self.deliver_tx(&tx_data),
            AbciRequest::EndBlock { height } => self.end_block(height),
            AbciRequest::Commit => self.commit(),
        };
        if let Err(e) = &result {
            warn!(request = name, phase = %self.phase, error = %e, "abci request rejected");
        }
        result
    }

    /// Handle a read-only request without exclusive access
    pub fn respond(&self, request: &AbciRequest) -> Result<AbciResponse, AbciError> {
        match request {
            AbciRequest::Info => Ok(AbciResponse::Info {
                height: self.chain.height(),
                app_hash: self.chain.state_root().to_hex(),
            }),
            AbciRequest::Query { path, data } => Ok(self.query(path, data)),
            other => Err(AbciError::OutOfOrder { request: other.name(), phase: self.phase.clone() }),
        }
    }

    fn out_of_order(&self, request: &'static str) -> AbciError {
        AbciError::OutOfOrder { request, phase: self.phase.clone() }
    }

    fn init_chain(
        &mut self,
        validators: Vec<GenesisValidator>,
        accounts: Vec<GenesisAccount>,
    ) -> Result<AbciResponse, AbciError> {
        if self.phase != Phase::Idle {
            return Err(self.out_of_order("InitChain"));
        }
        if self.initialized || !self.chain.is_pristine() {
            return Err(AbciError::AlreadyInitialized);
        }
        if accounts.iter().any(|a| a.address.is_empty()) {
            return Err(AbciError::EmptyGenesisAccount);
        }

        // Staged so a rejected validator leaves the set untouched.
        let mut staged = self.validators.clone();
        for v in &validators {
            staged.add_validator(&v.address, v.stake)?;
        }
        self.validators = staged;

        for account in &accounts {
            self.chain.init_account(&account.address, account.balance)?;
        }
        self.initialized = true;
        info!(accounts = accounts.len(), validators = validators.len(), "chain initialized");
        Ok(AbciResponse::InitChain)
    }

    fn begin_block(&mut self, height: u64, proposer: String) -> Result<AbciResponse, AbciError> {
        if self.phase != Phase::Idle {
            return Err(self.out_of_order("BeginBlock"));
        }
        let expected = self.chain.height() + 1;
        if height != expected {
            return Err(AbciError::UnexpectedHeight { expected, got: height });
        }
        if proposer.is_empty() {
            return Err(AbciError::EmptyProposer);
        }
        if self.validators.validator_count() > 0 && !self.validators.is_active(&proposer) {
            return Err(AbciError::UnknownProposer(proposer));
        }

        debug!(height, proposer = %proposer, "begin block");
        self.phase = Phase::InBlock { height, proposer };
        Ok(AbciResponse::BeginBlock)
    }

    fn deliver_tx(&mut self, tx_data: &[u8]) -> Result<AbciResponse, AbciError> {
        if !matches!(self.phase, Phase::InBlock { .. }) {
            return Err(self.out_of_order("DeliverTx"));
        }

        let response = |code: u32, log: String| -> Result<AbciResponse, AbciError> {
            Ok(AbciResponse::DeliverTx { code, log })
        };
        let text = match std::str::from_utf8(tx_data) {
            Ok(text) => text,
            Err(e) => return response(tx_code::INVALID_ENCODING, format!("transaction is not UTF-8: {e}")),
        };
        let tx: Transaction = match serde_json::from_str(text) {
            Ok(tx) => tx,
            Err(e) => return response(tx_code::MALFORMED, format!("invalid transaction format: {e}")),
        };
        match self.chain.add_transaction(tx) {
            Ok(id) => response(tx_code::OK, format!("transaction {id} accepted")),
            Err(e) => response(tx_code::REJECTED, format!("transaction rejected: {e}")),
        }
    }

    fn end_block(&mut self, height: u64) -> Result<AbciResponse, AbciError> {
        let proposer = match &self.phase {
            Phase::InBlock { height: h, proposer } if *h == height => proposer.clone(),
            Phase::InBlock { height: h, .. } => {
                return Err(AbciError::UnexpectedHeight { expected: *h, got: height })
            }
            _ => return Err(self.out_of_order("EndBlock")),
        };

        let produced = self.chain.produce_block(&proposer)?.height;
        if self.validators.is_active(&proposer) {
            self.validators.record_proposal(&proposer)?;
        }
        self.phase = Phase::Ended { height: produced };
        Ok(AbciResponse::EndBlock { validator_updates: vec![] })
    }

    fn commit(&mut self) -> Result<AbciResponse, AbciError> {
        let Phase::Ended { height } = self.phase else {
            return Err(self.out_of_order("Commit"));
        };
        let root = self.chain.commit()?;
        self.phase = Phase::Idle;
        info!(height, app_hash = %root, "block committed");
        Ok(AbciResponse::Commit { height, app_hash: root.to_hex() })
    }

    /// Produce and archive a block outside the ABCI cycle
    pub fn produce_block(&mut self, proposer: &str) -> Result<u64, AbciError> {
        if self.phase != Phase::Idle {
            return Err(self.out_of_order("block production"));
        }
        let height = self.chain.produce_block(proposer)?.height;
        if self.validators.is_active(proposer) {
            self.validators.record_proposal(proposer)?;
        }
        self.chain.commit()?;
        Ok(height)
    }

    fn query(&self, path: &str, data: &[u8]) -> AbciResponse {
        let found = |value: Vec<u8>, log: String| AbciResponse::Query { code: query_code::FOUND, value, log };
        let fail = |code, log: String| AbciResponse::Query { code, value: vec![], log };

        let segments: Vec<&str> = path.trim_start_matches('/').splitn(2, '/').collect();
        let arg = match segments.get(1) {
            Some(arg) => Some(*arg),
            None if !data.is_empty() => match std::str::from_utf8(data) {
                Ok(arg) => Some(arg),
                Err(_) => return fail(query_code::BAD_ARGUMENT, "query data is not UTF-8".into()),
            },
            None => None,
        };

        match (segments[0], arg) {
            ("height", None) => {
                let height = self.chain.height();
                found(height.to_string().into_bytes(), format!("height {height}"))
            }
            ("state_root", None) => {
                let root = self.chain.state_root().to_hex();
                found(root.clone().into_bytes(), format!("state root {root}"))
            }
            ("balance", Some(address)) | ("account", Some(address)) if address.is_empty() => {
                fail(query_code::BAD_ARGUMENT, "address must be non-empty".into())
            }
            ("balance", Some(address)) => match self.chain.account(address) {
                Some(account) => found(
                    account.balance.to_string().into_bytes(),
                    format!("balance for {address}: {}", account.balance),
                ),
                None => fail(query_code::NOT_FOUND, format!("account {address} not found")),
            },
            ("account", Some(address)) => match self.chain.account(address) {
                Some(account) => self.json(account, format!("account {address}")),
                None => fail(query_code::NOT_FOUND, format!("account {address} not found")),
            },
            ("block", Some(height)) => match height.parse::<u64>() {
                Ok(h) => match self.chain.block(h) {
                    Some(block) => self.json(block, format!("block {h}")),
                    None => fail(query_code::NOT_FOUND, format!("block {h} not found")),
                },
                Err(_) => fail(query_code::BAD_ARGUMENT, format!("invalid height {height:?}")),
            },
            ("validators", None) => {
                let validators: Vec<_> = self.validators.active_validators().collect();
                self.json(&validators, format!("{} validators", validators.len()))
            }
            _ => fail(query_code::UNKNOWN_PATH, format!("unknown query path: {path}")),
        }
    }

    fn json<T: serde::Serialize + ?Sized>(&self, value: &T, log: String) -> AbciResponse {
        match serde_json::to_vec(value) {
            Ok(value) => AbciResponse::Query { code: query_code::FOUND, value, log },
            Err(e) => AbciResponse::Query {
                code: query_code::BAD_ARGUMENT,
                value: vec![],
                log: format!("encoding failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> LedgerApp {
        LedgerApp::from_config(&BridgeConfig::default())
    }

    fn init(app: &mut LedgerApp) {
        app.process(AbciRequest::InitChain {
            validators: vec![],
            genesis_accounts: vec![
                GenesisAccount::new("alice", 1_000_000),
                GenesisAccount::new("bob", 500_000),
            ],
        })
        .unwrap();
    }

    fn tx_bytes(from: &str, to: &str, amount: u64, nonce: u64) -> Vec<u8> {
        serde_json::to_vec(&Transaction::new(from, to, amount, nonce)).unwrap()
    }

    fn query(app: &mut LedgerApp, path: &str) -> (u32, Vec<u8>) {
        match app.process(AbciRequest::Query { path: path.into(), data: vec![] }).unwrap() {
            AbciResponse::Query { code, value, .. } => (code, value),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut app = app();
        assert!(matches!(app.process(AbciRequest::Info).unwrap(), AbciResponse::Info { height: 0, .. }));
        init(&mut app);

        app.process(AbciRequest::BeginBlock { height: 1, proposer: "v1".into() }).unwrap();
        let delivered = app.process(AbciRequest::DeliverTx { tx_data: tx_bytes("alice", "bob", 1_000, 1) }).unwrap();
        assert!(matches!(delivered, AbciResponse::DeliverTx { code: tx_code::OK, .. }));
        app.process(AbciRequest::EndBlock { height: 1 }).unwrap();

        let AbciResponse::Commit { height, app_hash } = app.process(AbciRequest::Commit).unwrap() else {
            panic!("expected commit response");
        };
        assert_eq!(height, 1);
        assert_eq!(app_hash, app.chain().state_root().to_hex());
        assert!(!app_hash.is_empty());

        assert!(matches!(app.process(AbciRequest::Info).unwrap(), AbciResponse::Info { height: 1, .. }));
        assert_eq!(query(&mut app, "/balance/alice"), (0, b"999000".to_vec()));
        assert_eq!(app.phase(), &Phase::Idle);
    }

    #[test]
    fn test_second_init_chain_rejected() {
        let mut app = app();
        init(&mut app);
        let err = app
            .process(AbciRequest::InitChain { validators: vec![], genesis_accounts: vec![GenesisAccount::new("eve", 1)] })
            .unwrap_err();
        assert!(matches!(err, AbciError::AlreadyInitialized));
        assert_eq!(app.chain().balance("eve"), 0);
    }

    #[test]
    fn test_commit_before_begin_rejected() {
        let mut app = app();
        let err = app.process(AbciRequest::Commit).unwrap_err();
        assert!(matches!(err, AbciError::OutOfOrder { request: "Commit", .. }));
        assert!(matches!(
            app.process(AbciRequest::DeliverTx { tx_data: vec![] }),
            Err(AbciError::OutOfOrder { .. })
        ));
        assert!(matches!(app.process(AbciRequest::EndBlock { height: 1 }), Err(AbciError::OutOfOrder { .. })));
    }

    #[test]
    fn test_begin_block_height_checked() {
        let mut app = app();
        let err = app.process(AbciRequest::BeginBlock { height: 5, proposer: "v1".into() }).unwrap_err();
        assert!(matches!(err, AbciError::UnexpectedHeight { expected: 1, got: 5 }));
        assert_eq!(app.phase(), &Phase::Idle);
    }

    #[test]
    fn test_deliver_tx_codes() {
        let mut app = app();
        init(&mut app);
        app.process(AbciRequest::BeginBlock { height: 1, proposer: "v1".into() }).unwrap();

        let code = |response| match response {
            AbciResponse::DeliverTx { code, .. } => code,
            other => panic!("unexpected response {other:?}"),
        };
        let rejected = app.process(AbciRequest::DeliverTx { tx_data: tx_bytes("alice", "bob", 2_000_000, 1) });
        assert_eq!(code(rejected.unwrap()), tx_code::REJECTED);
        let malformed = app.process(AbciRequest::DeliverTx { tx_data: b"{not json".to_vec() });
        assert_eq!(code(malformed.unwrap()), tx_code::MALFORMED);
        let binary = app.process(AbciRequest::DeliverTx { tx_data: vec![0xff, 0xfe] });
        assert_eq!(code(binary.unwrap()), tx_code::INVALID_ENCODING);
        assert_eq!(app.chain().pending_count(), 0);
    }

    #[test]
    fn test_query_paths() {
        let mut app = app();
        init(&mut app);
        assert_eq!(query(&mut app, "/height"), (0, b"0".to_vec()));
        assert_eq!(query(&mut app, "/balance/nobody").0, query_code::NOT_FOUND);
        assert_eq!(query(&mut app, "/balance/").0, query_code::BAD_ARGUMENT);
        assert_eq!(query(&mut app, "/block/abc").0, query_code::BAD_ARGUMENT);
        assert_eq!(query(&mut app, "/block/7").0, query_code::NOT_FOUND);
        assert_eq!(query(&mut app, "/nonsense").0, query_code::UNKNOWN_PATH);

        let (code, value) = query(&mut app, "/account/bob");
        assert_eq!(code, query_code::FOUND);
        let account: serde_json::Value = serde_json::from_slice(&value).unwrap();
        assert_eq!(account["balance"], 500_000);

        let (code, value) = query(&mut app, "/block/0");
        assert_eq!(code, query_code::FOUND);
        let block: serde_json::Value = serde_json::from_slice(&value).unwrap();
        assert_eq!(block["height"], 0);
    }

    #[test]
    fn test_query_address_from_data() {
        let mut app = app();
        init(&mut app);
        let response = app
            .process(AbciRequest::Query { path: "/balance".into(), data: b"bob".to_vec() })
            .unwrap();
        assert_eq!(
            response,
            AbciResponse::Query { code: 0, value: b"500000".to_vec(), log: "balance for bob: 500000".into() }
        );
    }

    #[test]
    fn test_genesis_validators_gate_proposer() {
        let mut app = app();
        app.process(AbciRequest::InitChain {
            validators: vec![GenesisValidator::new("v1", 100)],
            genesis_accounts: vec![],
        })
        .unwrap();
        let err = app.process(AbciRequest::BeginBlock { height: 1, proposer: "mallory".into() }).unwrap_err();
        assert!(matches!(err, AbciError::UnknownProposer(_)));

        app.process(AbciRequest::BeginBlock { height: 1, proposer: "v1".into() }).unwrap();
        app.process(AbciRequest::EndBlock { height: 1 }).unwrap();
        app.process(AbciRequest::Commit).unwrap();
        assert_eq!(app.validators().get_validator("v1").unwrap().blocks_proposed, 1);
        assert_eq!(query(&mut app, "/validators").0, query_code::FOUND);
    }

    #[test]
    fn test_bad_genesis_validator_applies_nothing() {
        let mut app = app();
        let err = app
            .process(AbciRequest::InitChain {
                validators: vec![GenesisValidator::new("v1", 10), GenesisValidator::new("v2", 0)],
                genesis_accounts: vec![GenesisAccount::new("alice", 1)],
            })
            .unwrap_err();
        assert!(matches!(err, AbciError::Consensus(ConsensusError::StakeTooLow { .. })));
        assert_eq!(app.validators().validator_count(), 0);
        assert_eq!(app.chain().balance("alice"), 0);
        init(&mut app);
    }

    #[test]
    fn test_direct_production_refused_mid_block() {
        let mut app = app();
        init(&mut app);
        assert_eq!(app.produce_block("v1").unwrap(), 1);
        app.process(AbciRequest::BeginBlock { height: 2, proposer: "v1".into() }).unwrap();
        assert!(matches!(app.produce_block("v1"), Err(AbciError::OutOfOrder { .. })));
        assert_eq!(app.chain().height(), 1);
    }

    #[test]
    fn test_info_and_query_do_not_move_phase() {
        let mut app = app();
        init(&mut app);
        app.process(AbciRequest::BeginBlock { height: 1, proposer: "v1".into() }).unwrap();
        app.process(AbciRequest::Info).unwrap();
        query(&mut app, "/height");
        assert!(matches!(app.phase(), Phase::InBlock { height: 1, .. }));
    }
}
