//! End-to-end tests of the claim, migration and receipt flows against scripted
//! collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ethers::types::{Address, H256, U256};
use tokio::sync::mpsc;

use badge_claim::api::ClaimService;
use badge_claim::config::ClaimConfig;
use badge_claim::notifications::{ChannelNotifier, Dismissal, Notification, NotificationLevel};
use badge_claim::types::{
    ClaimRecord, EnsLookup, EventSummary, MigrationSignature, MintResult, QueueMessage, QueueReceipt, QueueResult,
    QueueStatus, TokenInfo, TransactionReceipt, TxStatus,
};
use badge_claim::wallet::{ContractCall, WalletProvider};
use badge_claim::{AppState, ClaimError, ClaimOutcome, ClaimResult, MigrationOutcome, MigrationState, PollOutcome, ReceiptVerdict};

const QR_HASH: &str = "abc123";
const BENEFICIARY: &str = "0x00000000000000000000000000000000000000aa";
const TX_HASH: u64 = 0x55;

/// Claim service replaying a fixed script
struct ScriptedService {
    /// Fetches answered with `pending` before the claim passes
    pending_polls: usize,
    fetch_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    signature_calls: AtomicUsize,
    expiry_date: Option<String>,
    /// Layer reported by token lookups
    layer: String,
}

impl ScriptedService {
    fn new(pending_polls: usize) -> Self {
        Self {
            pending_polls,
            fetch_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            signature_calls: AtomicUsize::new(0),
            expiry_date: None,
            layer: "Layer2".to_string(),
        }
    }

    fn token(&self, token_id: u64) -> TokenInfo {
        TokenInfo {
            token_id: token_id.to_string(),
            owner: BENEFICIARY.to_string(),
            event: EventSummary {
                id: 7,
                name: "ETHDenver".to_string(),
                expiry_date: None,
            },
            layer: Some(self.layer.clone()),
        }
    }

    fn claim(&self, status: TxStatus, claimed: bool) -> ClaimRecord {
        ClaimRecord {
            qr_hash: QR_HASH.to_string(),
            event_id: 7,
            event: Some(EventSummary {
                id: 7,
                name: "ETHDenver".to_string(),
                expiry_date: self.expiry_date.clone(),
            }),
            beneficiary: claimed.then(|| BENEFICIARY.to_string()),
            user_input: None,
            claimed,
            result: (status == TxStatus::Passed).then(|| MintResult { token: 42 }),
            tx_status: status,
            tx_hash: None,
            secret: Some("s3cret".to_string()),
            delegated_mint: false,
        }
    }
}

#[async_trait]
impl ClaimService for ScriptedService {
    async fn fetch_claim(&self, _qr_hash: &str) -> ClaimResult<ClaimRecord> {
        // Before submission the claim is unclaimed; afterwards it goes pending, then passes
        if self.submit_calls.load(Ordering::SeqCst) == 0 {
            return Ok(self.claim(TxStatus::None, false));
        }
        let count = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if count < self.pending_polls {
            Ok(self.claim(TxStatus::Pending, true))
        } else {
            Ok(self.claim(TxStatus::Passed, true))
        }
    }

    async fn submit_claim(&self, _qr_hash: &str, address: &str, secret: &str) -> ClaimResult<ClaimRecord> {
        assert_eq!(address, BENEFICIARY);
        assert_eq!(secret, "s3cret");
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.claim(TxStatus::None, true))
    }

    async fn request_migration_signature(&self, _token_id: u64) -> ClaimResult<MigrationSignature> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MigrationSignature {
            signature: "0xabcdef".to_string(),
        })
    }

    async fn fetch_token(&self, token_id: u64) -> ClaimResult<TokenInfo> {
        Ok(self.token(token_id))
    }

    async fn fetch_tokens_for(&self, account: &str) -> ClaimResult<Vec<TokenInfo>> {
        assert_eq!(account, BENEFICIARY);
        Ok(vec![self.token(42), self.token(43)])
    }

    async fn resolve_ens(&self, name: &str) -> ClaimResult<EnsLookup> {
        Ok(match name {
            "collector.eth" => EnsLookup::found(BENEFICIARY),
            _ => EnsLookup::not_found(),
        })
    }

    async fn lookup_ens(&self, address: &str) -> ClaimResult<EnsLookup> {
        Ok(match address {
            BENEFICIARY => EnsLookup::found("collector.eth"),
            _ => EnsLookup::not_found(),
        })
    }

    async fn redeem_with_email(&self, _email: &str, _address: &str, _token: &str) -> ClaimResult<QueueReceipt> {
        Ok(QueueReceipt {
            queue_uid: "q-1".to_string(),
        })
    }

    async fn fetch_queue_message(&self, uid: &str) -> ClaimResult<QueueMessage> {
        let count = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(QueueMessage {
            uid: uid.to_string(),
            operation: "redeem-email".to_string(),
            status: if count < 2 { QueueStatus::InProcess } else { QueueStatus::Finish },
            result: (count >= 2).then(|| QueueResult {
                tx_hash: "0xfeed".to_string(),
            }),
        })
    }
}

/// Wallet replaying a fixed script
struct ScriptedWallet {
    chain_id: u64,
    /// `None` makes estimation fail
    estimate: Option<u64>,
    /// Receipt polls answered with `None` before the receipt shows up
    receipt_nulls: usize,
    receipt_status: bool,
    receipt_calls: AtomicUsize,
    sent: Mutex<Vec<(ContractCall, U256)>>,
}

impl ScriptedWallet {
    fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            estimate: Some(100_000),
            receipt_nulls: 0,
            receipt_status: true,
            receipt_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<(ContractCall, U256)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn connect(&self) -> ClaimResult<u64> {
        Ok(self.chain_id)
    }

    async fn get_accounts(&self) -> ClaimResult<Vec<Address>> {
        Ok(vec![Address::from_low_u64_be(0xbb)])
    }

    async fn estimate_gas(&self, _call: &ContractCall) -> ClaimResult<U256> {
        self.estimate
            .map(U256::from)
            .ok_or_else(|| ClaimError::ProviderError("gas required exceeds allowance".into()))
    }

    async fn send_transaction(&self, call: &ContractCall, gas_limit: U256) -> ClaimResult<H256> {
        self.sent.lock().unwrap().push((call.clone(), gas_limit));
        Ok(H256::from_low_u64_be(TX_HASH))
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> ClaimResult<Option<TransactionReceipt>> {
        let count = self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if count < self.receipt_nulls {
            return Ok(None);
        }
        Ok(Some(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(1_000),
            gas_used: Some(U256::from(80_000)),
            status: self.receipt_status,
        }))
    }
}

fn config() -> ClaimConfig {
    let mut config = ClaimConfig::default();
    config.chain.chain_id = 1;
    config.chain.network_name = "mainnet".to_string();
    config.chain.mint_delegate_contract = "0x00000000000000000000000000000000000000cc".to_string();
    config
}

fn app(
    service: Arc<ScriptedService>,
    wallet: Arc<ScriptedWallet>,
) -> (AppState, mpsc::UnboundedReceiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::new();
    let state = AppState::new(config(), service, wallet, Arc::new(notifier)).unwrap();
    (state, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notifications.push(n);
    }
    notifications
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_three_pending_polls_then_token_42() {
    let service = Arc::new(ScriptedService::new(3));
    service.submit_calls.store(1, Ordering::SeqCst);
    let (state, _rx) = app(service.clone(), Arc::new(ScriptedWallet::new(1)));

    let start = tokio::time::Instant::now();
    let outcome = state.poller.track(QR_HASH).outcome().await;
    let claim = outcome.completed().unwrap();

    assert_eq!(claim.minted_token(), Some(42));
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 4);
    assert!(start.elapsed() >= Duration::from_secs(15));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_network_fails_without_submission() {
    let service = Arc::new(ScriptedService::new(0));
    let wallet = Arc::new(ScriptedWallet::new(100));
    let (state, mut rx) = app(service.clone(), wallet.clone());

    let mut handle = state.orchestrator.request_migration(42);
    let mut states = Vec::new();
    while let Some(next) = handle.next_transition().await {
        states.push(next);
    }

    let expected = ClaimError::NetworkMismatch { expected: 1, actual: 100 };
    assert_eq!(states.last(), Some(&MigrationState::Failed { reason: expected.clone() }));
    assert_eq!(handle.outcome().await, MigrationOutcome::Failed(expected));
    assert!(wallet.sent().is_empty());

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].message, "Wrong network, please connect to mainnet.");
    assert_eq!(notifications[0].dismissal, Dismissal::Manual);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_after_five_empty_polls() {
    let mut wallet = ScriptedWallet::new(1);
    wallet.receipt_nulls = 5;
    let wallet = Arc::new(wallet);
    let (state, _rx) = app(Arc::new(ScriptedService::new(0)), wallet.clone());

    let called = Arc::new(AtomicUsize::new(0));
    let flag = called.clone();
    let callback: badge_claim::monitor::ReceiptCallback = Box::new(move |receipt: &TransactionReceipt| {
        assert!(receipt.succeeded());
        flag.fetch_add(1, Ordering::SeqCst);
    });

    let start = tokio::time::Instant::now();
    let watch = state.receipts.watch(H256::from_low_u64_be(TX_HASH), Some(callback));
    let verdict = ReceiptVerdict::from_outcome(watch.outcome().await);

    assert!(matches!(verdict, ReceiptVerdict::Succeeded(_)));
    assert_eq!(wallet.receipt_calls.load(Ordering::SeqCst), 6);
    assert_eq!(called.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() >= Duration::from_secs(18));
    assert!(start.elapsed() < Duration::from_secs(19));
}

#[tokio::test(start_paused = true)]
async fn test_claim_then_migrate() {
    let service = Arc::new(ScriptedService::new(2));
    let wallet = Arc::new(ScriptedWallet::new(1));
    let (state, mut rx) = app(service.clone(), wallet.clone());

    let outcome = state
        .claim_flow()
        .claim(QR_HASH, BENEFICIARY, true, today())
        .await
        .unwrap();

    match outcome {
        ClaimOutcome::Tracked { claim, migration } => {
            assert_eq!(claim.minted_token(), Some(42));
            assert!(matches!(migration, Some(MigrationOutcome::Succeeded(_))));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.signature_calls.load(Ordering::SeqCst), 1);

    let sent = wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.to, Address::from_low_u64_be(0xcc));
    assert_eq!(sent[0].1, U256::from(130_000));

    let levels: Vec<NotificationLevel> = drain(&mut rx).into_iter().map(|n| n.level).collect();
    assert_eq!(levels, vec![NotificationLevel::Info, NotificationLevel::Success]);
}

#[tokio::test(start_paused = true)]
async fn test_gas_fallback_still_submits() {
    let mut wallet = ScriptedWallet::new(1);
    wallet.estimate = None;
    let wallet = Arc::new(wallet);
    let (state, _rx) = app(Arc::new(ScriptedService::new(0)), wallet.clone());

    let outcome = state.orchestrator.request_migration(42).outcome().await;
    assert!(matches!(outcome, MigrationOutcome::Succeeded(_)));
    assert_eq!(wallet.sent()[0].1, U256::from(1_300_000));
}

#[tokio::test(start_paused = true)]
async fn test_reverted_migration_stops_polling() {
    let mut wallet = ScriptedWallet::new(1);
    wallet.receipt_nulls = 1;
    wallet.receipt_status = false;
    let wallet = Arc::new(wallet);
    let (state, mut rx) = app(Arc::new(ScriptedService::new(0)), wallet.clone());

    let outcome = state.orchestrator.request_migration(42).outcome().await;
    assert!(matches!(outcome, MigrationOutcome::Failed(_)));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(wallet.receipt_calls.load(Ordering::SeqCst), 2);

    let notifications = drain(&mut rx);
    assert_eq!(
        notifications.last().map(|n| n.message.as_str()),
        Some("It seems that your transaction failed. Please refresh the page")
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_event_is_rejected() {
    let mut service = ScriptedService::new(0);
    service.expiry_date = Some("01-Feb-2021".to_string());
    let service = Arc::new(service);
    let (state, _rx) = app(service.clone(), Arc::new(ScriptedWallet::new(1)));

    let err = state
        .claim_flow()
        .claim(QR_HASH, BENEFICIARY, false, today())
        .await
        .unwrap_err();
    assert_eq!(err, ClaimError::EventExpired("01-Feb-2021".to_string()));
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_twice_is_noop() {
    let service = Arc::new(ScriptedService::new(usize::MAX));
    service.submit_calls.store(1, Ordering::SeqCst);
    let (state, _rx) = app(service.clone(), Arc::new(ScriptedWallet::new(1)));

    let tracker = state.poller.track(QR_HASH);
    tokio::time::sleep(Duration::from_secs(11)).await;
    tracker.cancel();
    tracker.cancel();

    assert_eq!(tracker.outcome().await, PollOutcome::Cancelled);
    assert_eq!(service.fetch_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_email_redemption_waits_for_queue() {
    let service = Arc::new(ScriptedService::new(0));
    let (state, mut rx) = app(service, Arc::new(ScriptedWallet::new(1)));

    let message = state
        .claim_flow()
        .redeem_email("collector@example.org", BENEFICIARY, "t0ken")
        .await
        .unwrap();
    assert_eq!(message.status, QueueStatus::Finish);
    assert_eq!(message.result.unwrap().tx_hash, "0xfeed");

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Success);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_day_is_rejected() {
    let mut service = ScriptedService::new(0);
    service.expiry_date = Some("01-Mar-2021".to_string());
    let service = Arc::new(service);
    let (state, mut rx) = app(service.clone(), Arc::new(ScriptedWallet::new(1)));

    let err = state
        .claim_flow()
        .claim(QR_HASH, BENEFICIARY, false, today())
        .await
        .unwrap_err();
    assert_eq!(err, ClaimError::EventExpired("01-Mar-2021".to_string()));
    assert_eq!(service.submit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Error);
}

#[tokio::test(start_paused = true)]
async fn test_canonical_chain_token_is_not_migrated() {
    let mut service = ScriptedService::new(0);
    service.layer = "Layer1".to_string();
    let service = Arc::new(service);
    let wallet = Arc::new(ScriptedWallet::new(1));
    let (state, mut rx) = app(service.clone(), wallet.clone());

    let outcome = state.orchestrator.request_migration(42).outcome().await;
    assert!(matches!(outcome, MigrationOutcome::Failed(ClaimError::InvalidInput(_))));
    assert_eq!(service.signature_calls.load(Ordering::SeqCst), 0);
    assert!(wallet.sent().is_empty());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_config_tracks_without_mint_contract() {
    let service = Arc::new(ScriptedService::new(1));
    service.submit_calls.store(1, Ordering::SeqCst);
    let wallet = Arc::new(ScriptedWallet::new(1));
    let (notifier, mut rx) = ChannelNotifier::new();
    let state = AppState::new(ClaimConfig::default(), service.clone(), wallet.clone(), Arc::new(notifier)).unwrap();

    let claim = state.poller.track(QR_HASH).outcome().await.completed().unwrap();
    assert_eq!(claim.minted_token(), Some(42));

    let outcome = state.orchestrator.request_migration(42).outcome().await;
    assert!(matches!(outcome, MigrationOutcome::Failed(ClaimError::Config(_))));
    assert_eq!(service.signature_calls.load(Ordering::SeqCst), 0);
    assert!(wallet.sent().is_empty());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_scan_collection_by_ens_and_address() {
    let (state, _rx) = app(Arc::new(ScriptedService::new(0)), Arc::new(ScriptedWallet::new(1)));
    let browser = state.collections();

    let by_name = browser.scan("collector.eth").await.unwrap();
    assert_eq!(by_name.display_name, "collector.eth");
    assert_eq!(by_name.account, BENEFICIARY);
    assert_eq!(by_name.tokens.len(), 2);

    let by_address = browser.scan(BENEFICIARY).await.unwrap();
    assert_eq!(by_address.display_name, "collector.eth");

    let err = browser.scan("stranger.eth").await.unwrap_err();
    assert!(matches!(err, ClaimError::InvalidInput(_)));

    let owned = browser.token(42).await.unwrap();
    assert_eq!(owned.owner_text(), format!("collector.eth ({})", BENEFICIARY));
}
