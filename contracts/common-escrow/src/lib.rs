#![no_std]
use soroban_sdk::{token, Address, Env};

/// Pull `amount` of `token` from `from` into the calling contract and return
/// the balance delta actually received. Fee-on-transfer tokens deliver less
/// than requested, so callers must compare the result against `amount`
/// instead of trusting the transfer.
pub fn pull(env: &Env, token: &Address, from: &Address, amount: i128) -> i128 {
    let client = token::Client::new(env, token);
    let this = env.current_contract_address();
    let before = client.balance(&this);
    client.transfer(from, &this, &amount);
    client.balance(&this) - before
}

/// Pay `amount` of `token` out of the calling contract to `to`. A zero amount
/// moves nothing; the caller still records the payment in its own bookkeeping.
pub fn pay(env: &Env, token: &Address, to: &Address, amount: i128) {
    if amount > 0 {
        let client = token::Client::new(env, token);
        client.transfer(&env.current_contract_address(), to, &amount);
    }
}
