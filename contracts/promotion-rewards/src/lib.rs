//! StakeBoost - Promotion Rewards (Soroban)
//! Epoch-based reward promotions for vault depositors, paid proportionally to
//! each depositor's time-weighted share of the vault during fixed epochs.
//!
//! A promotion escrows `tokens_per_epoch * number_of_epochs` of a reward token
//! at creation. Once an epoch elapses, depositors claim their share of that
//! epoch's allotment based on time-weighted balances read from the TWAB
//! oracle. Epoch boundaries must sit exactly on the oracle's period grid so
//! boundary epochs are never ambiguous.
//!
//! Events:
//! - ("promo", "create"): [promotion_id: u64, vault: Address, token: Address]
//! - ("promo", "extend"): [promotion_id: u64, additional_epochs: u32]
//! - ("promo", "end"): [promotion_id: u64, recipient: Address, refund: i128]
//! - ("promo", "destroy"): [promotion_id: u64, recipient: Address, amount: i128]
//! - ("rewards", "claimed"): [promotion_id: u64, account: Address, epoch_ids: Vec<u32>, total: i128]

#![no_std]
use soroban_sdk::{
    contract, contractimpl, contracttype, symbol_short, Address, Env, IntoVal, Symbol, Val, Vec,
};

// ============================================================
// Data Types
// ============================================================

#[contracttype]
#[derive(Clone)]
pub struct Promotion {
    pub creator: Address,
    pub vault: Address,
    pub token: Address,
    pub start_timestamp: u64,
    pub epoch_duration: u64,
    pub number_of_epochs: u32,
    pub created_at: u64,
    pub tokens_per_epoch: i128,
    pub rewards_unclaimed: i128,
}

/// 256-bit claim bitmask per (promotion, account). Epoch indexes are capped
/// at 255, so two u128 limbs cover the whole domain.
#[contracttype]
#[derive(Clone)]
pub struct ClaimMask {
    pub lo: u128,
    pub hi: u128,
}

impl ClaimMask {
    fn empty() -> Self {
        ClaimMask { lo: 0, hi: 0 }
    }

    fn is_claimed(&self, epoch_id: u32) -> bool {
        if epoch_id < 128 {
            self.lo >> epoch_id & 1 == 1
        } else {
            self.hi >> (epoch_id - 128) & 1 == 1
        }
    }

    fn set(&mut self, epoch_id: u32) {
        if epoch_id < 128 {
            self.lo |= 1 << epoch_id;
        } else {
            self.hi |= 1 << (epoch_id - 128);
        }
    }
}

#[contracttype]
#[derive(Clone)]
pub struct CreateParams {
    pub creator: Address,
    pub vault: Address,
    pub token: Address,
    pub start_timestamp: u64,
    pub tokens_per_epoch: i128,
    pub epoch_duration: u64,
    pub number_of_epochs: u32,
}

/// One operation inside a `multicall` batch.
#[contracttype]
#[derive(Clone)]
pub enum BatchOp {
    Create(CreateParams),
    Extend(Address, u64, u32),      // caller, promotion_id, additional_epochs
    End(Address, u64, Address),     // caller, promotion_id, recipient
    Destroy(Address, u64, Address), // caller, promotion_id, recipient
    Claim(Address, u64, Vec<u32>),  // account, promotion_id, epoch_ids
}

// ============================================================
// Storage Keys
// ============================================================

#[contracttype]
pub enum DataKey {
    TwabOracle,
    NextPromotionId,
    Promotion(u64),
    ClaimedEpochs(u64, Address), // promotion_id, account
}

// ============================================================
// Contract
// ============================================================

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

/// Epoch indexes live in an 8-bit domain.
const MAX_EPOCHS: u32 = 255;
/// Minimum claim window after a promotion concludes before the creator may
/// reclaim leftover funds (60 days in seconds).
const GRACE_PERIOD: u64 = 5_184_000;

#[contract]
pub struct PromotionRewardsContract;

#[contractimpl]
impl PromotionRewardsContract {
    pub fn initialize(env: Env, twab_oracle: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        if env.storage().instance().has(&DataKey::TwabOracle) {
            panic!("already initialized");
        }
        env.storage()
            .instance()
            .set(&DataKey::TwabOracle, &twab_oracle);
        env.storage()
            .instance()
            .set(&DataKey::NextPromotionId, &1u64);
    }

    /// Create a promotion over `vault` rewarding `tokens_per_epoch` of
    /// `token` per epoch. The full budget is pulled from `creator` up front.
    pub fn create_promotion(
        env: Env,
        creator: Address,
        vault: Address,
        token: Address,
        start_timestamp: u64,
        tokens_per_epoch: i128,
        epoch_duration: u64,
        number_of_epochs: u32,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        creator.require_auth();

        if tokens_per_epoch <= 0 {
            panic!("tokens per epoch is zero");
        }
        if epoch_duration == 0 {
            panic!("epoch duration is zero");
        }
        if number_of_epochs == 0 {
            panic!("number of epochs is zero");
        }
        if number_of_epochs > MAX_EPOCHS {
            panic!("exceeds max epochs");
        }

        // Epoch boundaries must coincide with the oracle's accounting grid.
        let oracle = Self::_oracle(&env);
        let period_length: u64 = env.invoke_contract(
            &oracle,
            &Symbol::new(&env, "period_length"),
            Vec::<Val>::new(&env),
        );
        let period_offset: u64 = env.invoke_contract(
            &oracle,
            &Symbol::new(&env, "period_offset"),
            Vec::<Val>::new(&env),
        );
        if epoch_duration % period_length != 0 {
            panic!("epoch duration not a multiple of twab period");
        }
        if start_timestamp < period_offset
            || (start_timestamp - period_offset) % period_length != 0
        {
            panic!("start time not aligned with twab period");
        }

        let amount = tokens_per_epoch * number_of_epochs as i128;
        let received = stakeboost_common_escrow::pull(&env, &token, &creator, amount);
        if received < amount {
            panic!("tokens received less than expected");
        }

        let promotion_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextPromotionId)
            .unwrap_or(1);

        let promotion = Promotion {
            creator,
            vault: vault.clone(),
            token: token.clone(),
            start_timestamp,
            epoch_duration,
            number_of_epochs,
            created_at: env.ledger().timestamp(),
            tokens_per_epoch,
            rewards_unclaimed: amount,
        };
        Self::_store_promotion(&env, promotion_id, &promotion);
        env.storage()
            .instance()
            .set(&DataKey::NextPromotionId, &(promotion_id + 1));

        env.events().publish(
            (symbol_short!("promo"), symbol_short!("create")),
            (promotion_id, vault, token),
        );

        promotion_id
    }

    /// Add epochs to an active promotion, pulling the additional funding from
    /// the creator.
    pub fn extend_promotion(env: Env, caller: Address, promotion_id: u64, additional_epochs: u32) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        caller.require_auth();

        let mut promotion = Self::_get_promotion(&env, promotion_id);
        if caller != promotion.creator {
            panic!("only promotion creator");
        }
        let current = Self::_epoch_at(&promotion, env.ledger().timestamp());
        if current >= promotion.number_of_epochs {
            panic!("promotion inactive");
        }
        if additional_epochs > MAX_EPOCHS - promotion.number_of_epochs {
            panic!("exceeds max epochs");
        }

        let amount = promotion.tokens_per_epoch * additional_epochs as i128;
        let received = stakeboost_common_escrow::pull(&env, &promotion.token, &caller, amount);
        if received < amount {
            panic!("tokens received less than expected");
        }

        promotion.number_of_epochs += additional_epochs;
        promotion.rewards_unclaimed += amount;
        Self::_store_promotion(&env, promotion_id, &promotion);

        env.events().publish(
            (symbol_short!("promo"), symbol_short!("extend")),
            (promotion_id, additional_epochs),
        );
    }

    /// Stop a promotion at the current epoch and refund the unaccrued epochs
    /// to `recipient`. Epochs that already elapsed stay claimable.
    pub fn end_promotion(env: Env, caller: Address, promotion_id: u64, recipient: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        caller.require_auth();

        let mut promotion = Self::_get_promotion(&env, promotion_id);
        if caller != promotion.creator {
            panic!("only promotion creator");
        }
        let current = Self::_epoch_at(&promotion, env.ledger().timestamp());
        if current >= promotion.number_of_epochs {
            panic!("promotion inactive");
        }

        let epochs_cut = promotion.number_of_epochs - current;
        let refund = promotion.tokens_per_epoch * epochs_cut as i128;

        // Bookkeeping settles before any tokens move.
        promotion.number_of_epochs = current;
        promotion.rewards_unclaimed -= refund;
        Self::_store_promotion(&env, promotion_id, &promotion);

        stakeboost_common_escrow::pay(&env, &promotion.token, &recipient, refund);

        env.events().publish(
            (symbol_short!("promo"), symbol_short!("end")),
            (promotion_id, recipient, refund),
        );
    }

    /// Reclaim everything still unclaimed once the grace period after the
    /// promotion's scheduled end has passed. The promotion id is retired
    /// permanently; ids are never reused.
    pub fn destroy_promotion(env: Env, caller: Address, promotion_id: u64, recipient: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        caller.require_auth();

        let promotion = Self::_get_promotion(&env, promotion_id);
        if caller != promotion.creator {
            panic!("only promotion creator");
        }

        let end_timestamp = promotion.start_timestamp
            + promotion.epoch_duration * promotion.number_of_epochs as u64;
        let grace_start = if promotion.created_at > end_timestamp {
            promotion.created_at
        } else {
            end_timestamp
        };
        if env.ledger().timestamp() < grace_start + GRACE_PERIOD {
            panic!("grace period active");
        }

        let amount = promotion.rewards_unclaimed;
        env.storage()
            .persistent()
            .remove(&DataKey::Promotion(promotion_id));

        stakeboost_common_escrow::pay(&env, &promotion.token, &recipient, amount);

        env.events().publish(
            (symbol_short!("promo"), symbol_short!("destroy")),
            (promotion_id, recipient, amount),
        );
    }

    /// Reward amounts for `account` over the requested epochs, in input
    /// order. Already-claimed epochs read as 0 so batch queries stay total.
    pub fn get_rewards_amount(
        env: Env,
        account: Address,
        promotion_id: u64,
        epoch_ids: Vec<u32>,
    ) -> Vec<i128> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);

        let promotion = Self::_get_promotion(&env, promotion_id);
        let now = env.ledger().timestamp();
        let oracle = Self::_oracle(&env);
        let mask = Self::_claim_mask(&env, promotion_id, &account);

        let mut amounts = Vec::new(&env);
        for epoch_id in epoch_ids.iter() {
            Self::_validate_epoch(&promotion, epoch_id, now);
            if mask.is_claimed(epoch_id) {
                amounts.push_back(0);
            } else {
                amounts.push_back(Self::_epoch_reward(
                    &env, &oracle, &promotion, &account, epoch_id,
                ));
            }
        }
        amounts
    }

    /// Pay `account` its rewards for the requested epochs. Claiming is
    /// permissionless; funds always go to `account`. Re-claiming an epoch is
    /// a hard error, unlike the read-only query.
    pub fn claim_rewards(env: Env, account: Address, promotion_id: u64, epoch_ids: Vec<u32>) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);

        let mut promotion = Self::_get_promotion(&env, promotion_id);
        let now = env.ledger().timestamp();
        let oracle = Self::_oracle(&env);
        let mut mask = Self::_claim_mask(&env, promotion_id, &account);

        let mut total: i128 = 0;
        for epoch_id in epoch_ids.iter() {
            Self::_validate_epoch(&promotion, epoch_id, now);
            if mask.is_claimed(epoch_id) {
                panic!("rewards already claimed");
            }
            mask.set(epoch_id);
            total += Self::_epoch_reward(&env, &oracle, &promotion, &account, epoch_id);
        }

        // Claim-then-pay: the mask and unclaimed balance are settled before
        // the token transfer can re-enter.
        let mask_key = DataKey::ClaimedEpochs(promotion_id, account.clone());
        env.storage().persistent().set(&mask_key, &mask);
        env.storage().persistent().extend_ttl(
            &mask_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );

        promotion.rewards_unclaimed -= total;
        Self::_store_promotion(&env, promotion_id, &promotion);

        stakeboost_common_escrow::pay(&env, &promotion.token, &account, total);

        env.events().publish(
            (symbol_short!("rewards"), symbol_short!("claimed")),
            (promotion_id, account, epoch_ids, total),
        );

        total
    }

    /// Run a batch of operations in order as one atomic unit. Any failing op
    /// aborts the whole invocation, so no partial batch is ever retained.
    /// Returns one value per op: the new id for creates, the total paid for
    /// claims, 0 otherwise.
    pub fn multicall(env: Env, ops: Vec<BatchOp>) -> Vec<i128> {
        let mut results = Vec::new(&env);
        for op in ops.iter() {
            let result = match op {
                BatchOp::Create(params) => Self::create_promotion(
                    env.clone(),
                    params.creator,
                    params.vault,
                    params.token,
                    params.start_timestamp,
                    params.tokens_per_epoch,
                    params.epoch_duration,
                    params.number_of_epochs,
                ) as i128,
                BatchOp::Extend(caller, promotion_id, additional_epochs) => {
                    Self::extend_promotion(env.clone(), caller, promotion_id, additional_epochs);
                    0
                }
                BatchOp::End(caller, promotion_id, recipient) => {
                    Self::end_promotion(env.clone(), caller, promotion_id, recipient);
                    0
                }
                BatchOp::Destroy(caller, promotion_id, recipient) => {
                    Self::destroy_promotion(env.clone(), caller, promotion_id, recipient);
                    0
                }
                BatchOp::Claim(account, promotion_id, epoch_ids) => {
                    Self::claim_rewards(env.clone(), account, promotion_id, epoch_ids)
                }
            };
            results.push_back(result);
        }
        results
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn get_promotion(env: Env, promotion_id: u64) -> Option<Promotion> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::Promotion(promotion_id))
    }

    /// Epoch index at the current instant: floor((now - start) / duration),
    /// 0 before the start. Not capped at number_of_epochs; callers compare
    /// against it to detect a finished promotion.
    pub fn get_current_epoch_id(env: Env, promotion_id: u64) -> u32 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let promotion = Self::_get_promotion(&env, promotion_id);
        Self::_epoch_at(&promotion, env.ledger().timestamp())
    }

    pub fn get_remaining_rewards(env: Env, promotion_id: u64) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_get_promotion(&env, promotion_id).rewards_unclaimed
    }

    // ============================================================
    // Internal Helpers
    // ============================================================

    fn _oracle(env: &Env) -> Address {
        env.storage()
            .instance()
            .get(&DataKey::TwabOracle)
            .expect("not initialized")
    }

    fn _get_promotion(env: &Env, promotion_id: u64) -> Promotion {
        env.storage()
            .persistent()
            .get(&DataKey::Promotion(promotion_id))
            .expect("invalid promotion")
    }

    fn _store_promotion(env: &Env, promotion_id: u64, promotion: &Promotion) {
        let _ttl_key = DataKey::Promotion(promotion_id);
        env.storage().persistent().set(&_ttl_key, promotion);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _claim_mask(env: &Env, promotion_id: u64, account: &Address) -> ClaimMask {
        env.storage()
            .persistent()
            .get(&DataKey::ClaimedEpochs(promotion_id, account.clone()))
            .unwrap_or(ClaimMask::empty())
    }

    fn _epoch_at(promotion: &Promotion, now: u64) -> u32 {
        if now < promotion.start_timestamp {
            return 0;
        }
        ((now - promotion.start_timestamp) / promotion.epoch_duration).min(u32::MAX as u64) as u32
    }

    fn _validate_epoch(promotion: &Promotion, epoch_id: u32, now: u64) {
        if epoch_id >= promotion.number_of_epochs {
            panic!("invalid epoch id");
        }
        let epoch_end =
            promotion.start_timestamp + promotion.epoch_duration * (epoch_id as u64 + 1);
        if now < epoch_end {
            panic!("epoch not over");
        }
    }

    /// Proportional share of one epoch's allotment. Integer division rounds
    /// down, so the sum of all claims for an epoch never exceeds
    /// tokens_per_epoch.
    fn _epoch_reward(
        env: &Env,
        oracle: &Address,
        promotion: &Promotion,
        account: &Address,
        epoch_id: u32,
    ) -> i128 {
        let start = promotion.start_timestamp + promotion.epoch_duration * epoch_id as u64;
        let end = start + promotion.epoch_duration;

        let total_twab: i128 = env.invoke_contract(
            oracle,
            &Symbol::new(env, "time_weighted_total_supply"),
            Vec::from_array(
                env,
                [
                    promotion.vault.clone().into_val(env),
                    start.into_val(env),
                    end.into_val(env),
                ],
            ),
        );
        if total_twab == 0 {
            return 0;
        }

        let user_twab: i128 = env.invoke_contract(
            oracle,
            &Symbol::new(env, "time_weighted_balance"),
            Vec::from_array(
                env,
                [
                    promotion.vault.clone().into_val(env),
                    account.clone().into_val(env),
                    start.into_val(env),
                    end.into_val(env),
                ],
            ),
        );

        promotion.tokens_per_epoch * user_twab / total_twab
    }
}
