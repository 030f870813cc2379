#![allow(dead_code)]

use floorplan::api::AppState;
use floorplan::domain::{Dealer, LoanTerms, NewDealer};
use floorplan::{init_db, Config, Decimal, Loan, Repository};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    pub state: AppState,
    _temp: TempDir,
}

pub async fn setup() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let env = HashMap::from([("DATABASE_PATH".to_string(), db_path)]);
    let config = Config::from_env_map(env).unwrap();
    let state = AppState::new(Arc::new(Repository::new(pool)), config);

    TestEnv {
        state,
        _temp: temp_dir,
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

pub async fn dealer(state: &AppState, wallet: &str, email: &str) -> Dealer {
    state
        .accounts
        .connect_wallet(NewDealer {
            wallet_address: wallet.parse().unwrap(),
            name: "Sunset Motors".to_string(),
            address: "200 Harbor Blvd".to_string(),
            phone: "555-0142".to_string(),
            email: email.to_string(),
            lot_location: None,
        })
        .await
        .unwrap()
}

pub fn terms(dealer_id: &str, amount: &str, term_months: u32) -> LoanTerms {
    LoanTerms {
        dealer_id: dealer_id.to_string(),
        amount: dec(amount),
        currency: "USDC".to_string(),
        interest_rate: dec("9"),
        flat_fee: dec("50"),
        term_months,
        vehicles_financed: 2,
    }
}

pub async fn active_loan(state: &AppState, dealer_id: &str, amount: &str, term_months: u32) -> Loan {
    let loan = state
        .loans
        .originate(terms(dealer_id, amount, term_months))
        .await
        .unwrap();
    state.loans.approve(&loan.id).await.unwrap()
}
