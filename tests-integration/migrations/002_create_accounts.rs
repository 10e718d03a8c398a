//! Individual accounts linked to the chart of accounts

use pgstep::migration::{Collection, Step};
use pgstep::SqlExecutor;

pub fn register(collection: &mut Collection) {
    collection.must_register(Step::tx(|tx| {
        tx.execute(
            r#"
            CREATE TABLE accounts (
                id BIGSERIAL PRIMARY KEY,
                chart_of_account_id BIGINT NOT NULL REFERENCES chart_of_accounts(id) ON DELETE RESTRICT,
                code VARCHAR(50) NOT NULL,
                name VARCHAR(255) NOT NULL,
                normal_balance VARCHAR(10) NOT NULL,
                currency_code VARCHAR(3) NOT NULL DEFAULT 'USD',
                is_active BOOLEAN NOT NULL DEFAULT true
            )
            "#,
            &[],
        )?;
        tx.execute(
            "INSERT INTO chart_of_accounts (code, name, account_type) VALUES ('1000', 'Assets', 'ASSET')",
            &[],
        )?;
        Ok(())
    }));
}
