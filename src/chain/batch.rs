use std::sync::Arc;

use alloy_primitives::{Address, Bytes, I256, U256};
use alloy_sol_types::SolCall;
use tracing::debug;

use crate::abi::{IMulticall3, IVotingEscrow};
use crate::config::Config;
use crate::error::Result;
use crate::rpc::client::ResilientClient;
use crate::types::PositionRecord;

/// Sub-calls issued per token id, in this order.
pub const CALLS_PER_TOKEN: usize = 4;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub requested: usize,
    pub decoded: usize,
    pub skipped_failed_call: usize,
    pub skipped_empty_weight: usize,
    pub skipped_zero_weight: usize,
    pub skipped_undecodable: usize,
}

impl BatchStats {
    pub fn skipped(&self) -> usize {
        self.skipped_failed_call
            + self.skipped_empty_weight
            + self.skipped_zero_weight
            + self.skipped_undecodable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    FailedCall,
    EmptyWeight,
    ZeroWeight,
    Undecodable,
}

/// Decoded `locked(id)` return data. Contract versions disagree on the shape,
/// so the pair form is tried before the single-word form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedDetail {
    /// `(int128 amount, uint256 end)`; trailing words are ignored.
    Pair { amount: I256, end: U256 },
    /// A single signed word holding the amount.
    Scalar { amount: I256 },
}

impl LockedDetail {
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() >= 64 {
            let amount = signed_word(&data[..32])?;
            let end = U256::from_be_slice(&data[32..64]);
            return Some(LockedDetail::Pair { amount, end });
        }
        if data.len() >= 32 {
            return Some(LockedDetail::Scalar { amount: signed_word(&data[..32])? });
        }
        None
    }

    pub fn amount(&self) -> I256 {
        match self {
            LockedDetail::Pair { amount, .. } | LockedDetail::Scalar { amount } => *amount,
        }
    }

    pub fn end(&self) -> Option<U256> {
        match self {
            LockedDetail::Pair { end, .. } => Some(*end),
            LockedDetail::Scalar { .. } => None,
        }
    }
}

/// Read a 32-byte word as a sign-extended int128. Words whose high half is
/// not a valid sign extension are rejected.
fn signed_word(word: &[u8]) -> Option<I256> {
    let value = I256::from_raw(U256::from_be_slice(word));
    let bound = I256::from_raw(U256::from(1u8) << 127usize);
    (value >= -bound && value < bound).then_some(value)
}

/// Reads lock positions for a list of token ids with one Multicall3 round trip.
pub struct BatchFetcher {
    client: Arc<ResilientClient>,
    contract: Address,
    multicall: Address,
}

impl BatchFetcher {
    pub fn new(client: Arc<ResilientClient>, contract: Address, multicall: Address) -> Self {
        Self { client, contract, multicall }
    }

    pub fn from_config(cfg: &Config, client: Arc<ResilientClient>) -> Self {
        Self::new(client, cfg.ve_contract, cfg.multicall_address)
    }

    /// Fetch and normalize positions for `ids`. Tokens that fail to read or
    /// carry no voting power are skipped and counted, never returned as errors.
    pub async fn fetch_batch(&self, ids: &[u64]) -> Result<(Vec<PositionRecord>, BatchStats)> {
        if ids.is_empty() {
            return Ok((Vec::new(), BatchStats::default()));
        }

        let calls = ids.iter().flat_map(|&id| self.calls_for(id)).collect();
        let results = self.client.aggregate(self.multicall, calls).await?;
        let (records, stats) = decode_positions(ids, &results);

        debug!(
            first = ids.first().copied().unwrap_or_default(),
            last = ids.last().copied().unwrap_or_default(),
            requested = stats.requested,
            decoded = stats.decoded,
            failed_call = stats.skipped_failed_call,
            empty_weight = stats.skipped_empty_weight,
            zero_weight = stats.skipped_zero_weight,
            undecodable = stats.skipped_undecodable,
            "[BATCH] decoded {} positions",
            stats.decoded
        );
        Ok((records, stats))
    }

    fn calls_for(&self, id: u64) -> [IMulticall3::Call3; CALLS_PER_TOKEN] {
        let token_id = U256::from(id);
        let call = |data: Vec<u8>| IMulticall3::Call3 {
            target: self.contract,
            allowFailure: true,
            callData: Bytes::from(data),
        };
        [
            call(IVotingEscrow::balanceOfNFTCall { tokenId: token_id }.abi_encode()),
            call(IVotingEscrow::ownerOfCall { tokenId: token_id }.abi_encode()),
            call(IVotingEscrow::locked__endCall { tokenId: token_id }.abi_encode()),
            call(IVotingEscrow::lockedCall { tokenId: token_id }.abi_encode()),
        ]
    }
}

/// Interpret aggregate results positionally: token `ids[i]` owns
/// `results[i * 4 .. i * 4 + 4]`.
pub fn decode_positions(ids: &[u64], results: &[IMulticall3::Result]) -> (Vec<PositionRecord>, BatchStats) {
    let mut stats = BatchStats { requested: ids.len(), ..Default::default() };
    let mut records = Vec::with_capacity(ids.len());

    for (i, &token_id) in ids.iter().enumerate() {
        let Some(slice) = results.get(i * CALLS_PER_TOKEN..(i + 1) * CALLS_PER_TOKEN) else {
            stats.skipped_failed_call += 1;
            continue;
        };
        match decode_position(token_id, slice) {
            Ok(record) => {
                stats.decoded += 1;
                records.push(record);
            }
            Err(skip) => match skip {
                Skip::FailedCall => stats.skipped_failed_call += 1,
                Skip::EmptyWeight => stats.skipped_empty_weight += 1,
                Skip::ZeroWeight => stats.skipped_zero_weight += 1,
                Skip::Undecodable => stats.skipped_undecodable += 1,
            },
        }
    }
    (records, stats)
}

fn decode_position(token_id: u64, r: &[IMulticall3::Result]) -> std::result::Result<PositionRecord, Skip> {
    let [weight, owner, end, locked] = r else {
        return Err(Skip::FailedCall);
    };
    if !(weight.success && owner.success && end.success && locked.success) {
        return Err(Skip::FailedCall);
    }
    if weight.returnData.is_empty() {
        return Err(Skip::EmptyWeight);
    }

    let voting_power = IVotingEscrow::balanceOfNFTCall::abi_decode_returns(&weight.returnData)
        .map_err(|_| Skip::Undecodable)?;
    if voting_power.is_zero() {
        return Err(Skip::ZeroWeight);
    }
    let owner = IVotingEscrow::ownerOfCall::abi_decode_returns(&owner.returnData)
        .map_err(|_| Skip::Undecodable)?;
    let detail = LockedDetail::decode(&locked.returnData).ok_or(Skip::Undecodable)?;
    // An empty `locked__end` falls back to the end word of `locked`.
    let lock_end = if end.returnData.is_empty() {
        detail.end()
    } else {
        IVotingEscrow::locked__endCall::abi_decode_returns(&end.returnData).ok()
    }
    .and_then(|v| u64::try_from(v).ok())
    .ok_or(Skip::Undecodable)?;

    Ok(PositionRecord {
        token_id,
        owner,
        voting_power,
        locked_amount: detail.amount().unsigned_abs(),
        lock_end,
    })
}
