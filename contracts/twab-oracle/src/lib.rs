//! StakeBoost - TWAB Oracle (Soroban)
//! Reporter-fed time-weighted average balance feeds for vault depositors on Stellar.
//!
//! Observations are keyed to a fixed period grid: period `p` covers
//! `[period_offset + p * period_length, period_offset + (p + 1) * period_length)`.
//! Queries over an aligned half-open range return the mean of the covered
//! per-period averages.
//!
//! Events:
//! - ("twab", "report"): [vault: Address, period: u64, twab: i128]

#![no_std]
use soroban_sdk::{contract, contractimpl, contracttype, symbol_short, Address, Env};

#[contracttype]
pub enum DataKey {
    Admin,
    PeriodLength,
    PeriodOffset,
    ReporterCount,
    AuthorizedReporter(Address),
    AccountTwab(Address, Address, u64), // vault, account, period
    TotalTwab(Address, u64),            // vault, period
}

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

#[contract]
pub struct TwabOracleContract;

#[contractimpl]
impl TwabOracleContract {
    pub fn initialize(env: Env, admin: Address, period_length: u64, period_offset: u64) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        if env.storage().instance().has(&DataKey::Admin) {
            panic!("already initialized");
        }
        if period_length == 0 {
            panic!("period length is zero");
        }
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&DataKey::PeriodLength, &period_length);
        env.storage()
            .instance()
            .set(&DataKey::PeriodOffset, &period_offset);
        env.storage().instance().set(&DataKey::ReporterCount, &0u32);
    }

    pub fn add_reporter(env: Env, admin: Address, reporter: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        admin.require_auth();
        let stored_admin: Address = env.storage().instance().get(&DataKey::Admin).unwrap();
        if admin != stored_admin {
            panic!("unauthorized");
        }
        let _ttl_key = DataKey::AuthorizedReporter(reporter);
        env.storage().persistent().set(&_ttl_key, &true);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );

        let count: u32 = env
            .storage()
            .instance()
            .get(&DataKey::ReporterCount)
            .unwrap_or(0);
        env.storage()
            .instance()
            .set(&DataKey::ReporterCount, &(count + 1));
    }

    pub fn remove_reporter(env: Env, admin: Address, reporter: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        admin.require_auth();
        let stored_admin: Address = env.storage().instance().get(&DataKey::Admin).unwrap();
        if admin != stored_admin {
            panic!("unauthorized");
        }
        env.storage()
            .persistent()
            .remove(&DataKey::AuthorizedReporter(reporter));
    }

    /// Record the time-weighted average balance of `account` in `vault` over
    /// period `period`. Overwrites are allowed so reporters can correct a
    /// published observation.
    pub fn record_balance(
        env: Env,
        reporter: Address,
        vault: Address,
        account: Address,
        period: u64,
        twab: i128,
    ) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        reporter.require_auth();
        Self::_require_reporter(&env, &reporter);
        if twab < 0 {
            panic!("negative twab");
        }

        let _ttl_key = DataKey::AccountTwab(vault.clone(), account, period);
        env.storage().persistent().set(&_ttl_key, &twab);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );

        env.events().publish(
            (symbol_short!("twab"), symbol_short!("report")),
            (vault, period, twab),
        );
    }

    /// Record the time-weighted average total supply of `vault` over `period`.
    pub fn record_total_supply(env: Env, reporter: Address, vault: Address, period: u64, twab: i128) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        reporter.require_auth();
        Self::_require_reporter(&env, &reporter);
        if twab < 0 {
            panic!("negative twab");
        }

        let _ttl_key = DataKey::TotalTwab(vault.clone(), period);
        env.storage().persistent().set(&_ttl_key, &twab);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );

        env.events().publish(
            (symbol_short!("twab"), symbol_short!("report")),
            (vault, period, twab),
        );
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn period_length(env: Env) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .instance()
            .get(&DataKey::PeriodLength)
            .expect("not initialized")
    }

    pub fn period_offset(env: Env) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .instance()
            .get(&DataKey::PeriodOffset)
            .expect("not initialized")
    }

    /// Time-weighted average balance of `account` in `vault` over the
    /// half-open range `[start, end)`. Both bounds must sit on the period
    /// grid. Periods with no recorded observation contribute 0.
    pub fn time_weighted_balance(
        env: Env,
        vault: Address,
        account: Address,
        start: u64,
        end: u64,
    ) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let (first, count) = Self::_validate_range(&env, start, end);

        let mut sum: i128 = 0;
        for p in first..first + count {
            let twab: i128 = env
                .storage()
                .persistent()
                .get(&DataKey::AccountTwab(vault.clone(), account.clone(), p))
                .unwrap_or(0);
            sum += twab;
        }
        sum / count as i128
    }

    /// Time-weighted average total supply of `vault` over `[start, end)`.
    pub fn time_weighted_total_supply(env: Env, vault: Address, start: u64, end: u64) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let (first, count) = Self::_validate_range(&env, start, end);

        let mut sum: i128 = 0;
        for p in first..first + count {
            let twab: i128 = env
                .storage()
                .persistent()
                .get(&DataKey::TotalTwab(vault.clone(), p))
                .unwrap_or(0);
            sum += twab;
        }
        sum / count as i128
    }

    // ============================================================
    // Internal Helpers
    // ============================================================

    fn _require_reporter(env: &Env, reporter: &Address) {
        let authorized: bool = env
            .storage()
            .persistent()
            .get(&DataKey::AuthorizedReporter(reporter.clone()))
            .unwrap_or(false);
        if !authorized {
            panic!("unauthorized reporter");
        }
    }

    /// Returns (first period index, period count) for an aligned range.
    fn _validate_range(env: &Env, start: u64, end: u64) -> (u64, u64) {
        let length: u64 = env
            .storage()
            .instance()
            .get(&DataKey::PeriodLength)
            .expect("not initialized");
        let offset: u64 = env.storage().instance().get(&DataKey::PeriodOffset).unwrap();

        if end <= start {
            panic!("empty range");
        }
        if start < offset
            || (start - offset) % length != 0
            || (end - offset) % length != 0
        {
            panic!("range not aligned with twab period");
        }
        ((start - offset) / length, (end - start) / length)
    }
}
