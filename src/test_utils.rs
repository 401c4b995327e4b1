//! In-memory chain and fixture builders shared by the unit tests.

use crate::abi::{encode_string, encode_u8, DECIMALS_SELECTOR, NAME_SELECTOR, SYMBOL_SELECTOR};
use crate::rpc::{BlockTag, ChainClient};
use crate::types::{Block, Log, Receipt, Transaction, TRANSFER_SELECTOR};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

pub const GWEI: u64 = 1_000_000_000;

/// Deterministic address `0xaa00..00nn`.
pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    bytes[0] = 0xaa;
    Address::from(bytes)
}

/// Deterministic hash `0x00..00nn`.
pub fn hash(n: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[31] = n;
    B256::from(bytes)
}

/// `n` thousandths of an ether, in wei.
pub fn milli_ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000u64)
}

pub fn ether(n: u64) -> U256 {
    milli_ether(n * 1000)
}

fn base_tx(n: u8, from: Address, to: Option<Address>, input: Vec<u8>) -> Transaction {
    Transaction {
        hash: hash(n),
        from,
        to,
        value: U256::ZERO,
        gas_price: Some(U256::from(GWEI)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        gas: U256::from(21_000u64),
        input,
        r: Some(U256::from(n)),
        s: Some(U256::from(0xbeefu64)),
        v: Some(27),
    }
}

/// Plain value transfer.
pub fn native_tx(n: u8, from: Address, to: Address, value: U256) -> Transaction {
    let mut tx = base_tx(n, from, Some(to), Vec::new());
    tx.value = value;
    tx
}

/// `transfer(address,uint256)` call to `contract`.
pub fn token_tx(n: u8, from: Address, contract: Address) -> Transaction {
    let mut input = TRANSFER_SELECTOR.to_vec();
    input.extend_from_slice(&[0u8; 64]);
    let mut tx = base_tx(n, from, Some(contract), input);
    tx.gas = U256::from(60_000u64);
    tx
}

/// Any other contract call.
pub fn other_tx(n: u8, from: Address, contract: Address) -> Transaction {
    base_tx(n, from, Some(contract), vec![0x09, 0x5e, 0xa7, 0xb3])
}

fn address_topic(a: Address) -> String {
    format!("0x{}{}", "0".repeat(24), hex::encode(a.as_slice()))
}

/// ERC20 `Transfer` log.
pub fn transfer_log(contract: Address, from: Address, to: Address, raw: U256) -> Log {
    Log {
        address: contract,
        topics: vec![TRANSFER_TOPIC.to_string(), address_topic(from), address_topic(to)],
        data: raw.to_be_bytes::<32>().to_vec(),
    }
}

/// ERC721-style `Transfer` log (tokenId indexed, four topics).
pub fn nft_transfer_log(contract: Address, from: Address, to: Address) -> Log {
    let mut log = transfer_log(contract, from, to, U256::ZERO);
    log.topics.push(format!("0x{:064x}", 7));
    log.data = Vec::new();
    log
}

pub fn receipt(tx: &Transaction, gas_used: u64, effective_gas_price: U256, logs: Vec<Log>) -> Receipt {
    Receipt {
        transaction_hash: tx.hash,
        gas_used: U256::from(gas_used),
        effective_gas_price: Some(effective_gas_price),
        logs,
    }
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: hash(0xf0),
        base_fee_per_gas: None,
        transactions,
    }
}

/// Chain answers served from memory, with request counters.
#[derive(Default)]
pub struct MockChain {
    pub blocks: HashMap<u64, Block>,
    pub head: Option<u64>,
    pub receipts: HashMap<B256, Receipt>,
    pub balances: HashMap<(Address, u64), U256>,
    pub failing_balances: HashSet<Address>,
    pub failing_receipts: HashSet<B256>,
    pub views: HashMap<(Address, [u8; 4]), Vec<u8>>,
    pub balance_requests: Mutex<Vec<(Address, u64)>>,
    pub receipt_requests: AtomicUsize,
    pub view_requests: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.head = Some(self.head.map_or(block.number, |h| h.max(block.number)));
        self.blocks.insert(block.number, block);
        self
    }

    pub fn with_balance(mut self, account: Address, height: u64, wei: U256) -> Self {
        self.balances.insert((account, height), wei);
        self
    }

    pub fn with_failing_balance(mut self, account: Address) -> Self {
        self.failing_balances.insert(account);
        self
    }

    pub fn with_receipt(mut self, receipt: Receipt) -> Self {
        self.receipts.insert(receipt.transaction_hash, receipt);
        self
    }

    /// Register a token answering all three metadata views.
    pub fn with_token(mut self, contract: Address, name: &str, symbol: &str, decimals: u8) -> Self {
        self.views.insert((contract, NAME_SELECTOR), encode_string(name));
        self.views.insert((contract, SYMBOL_SELECTOR), encode_string(symbol));
        self.views.insert((contract, DECIMALS_SELECTOR), encode_u8(decimals));
        self
    }

    pub fn with_view(mut self, contract: Address, selector: [u8; 4], data: Vec<u8>) -> Self {
        self.views.insert((contract, selector), data);
        self
    }

    pub fn balance_request_count(&self) -> usize {
        self.balance_requests.lock().unwrap().len()
    }

    pub fn view_request_count(&self) -> usize {
        self.view_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_block(&self, tag: BlockTag) -> Result<Option<Block>> {
        let number = match tag {
            BlockTag::Latest => match self.head {
                Some(h) => h,
                None => return Ok(None),
            },
            BlockTag::Number(n) => n,
        };
        Ok(self.blocks.get(&number).cloned())
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        self.receipt_requests.fetch_add(1, Ordering::SeqCst);
        if self.failing_receipts.contains(&tx_hash) {
            anyhow::bail!("RPC error: request timed out");
        }
        Ok(self.receipts.get(&tx_hash).cloned())
    }

    async fn get_balance(&self, address: Address, height: u64) -> Result<U256> {
        self.balance_requests.lock().unwrap().push((address, height));
        if self.failing_balances.contains(&address) {
            anyhow::bail!("RPC error: rate limited");
        }
        Ok(self.balances.get(&(address, height)).copied().unwrap_or(U256::ZERO))
    }

    async fn call(&self, to: Address, data: &[u8], _tag: BlockTag) -> Result<Vec<u8>> {
        self.view_requests.fetch_add(1, Ordering::SeqCst);
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        self.views
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("RPC error: execution reverted"))
    }
}
