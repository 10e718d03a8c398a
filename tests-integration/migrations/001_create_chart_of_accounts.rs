//! Creates the chart of accounts for the accounting fixture

use pgstep::migration::{Collection, Step};
use pgstep::SqlExecutor;

pub fn register(collection: &mut Collection) {
    collection.must_register(Step::tx(|tx| {
        // Hierarchical structure for organizing accounts
        tx.execute(
            r#"
            CREATE TABLE chart_of_accounts (
                id BIGSERIAL PRIMARY KEY,
                code VARCHAR(50) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                account_type VARCHAR(50) NOT NULL,
                parent_id BIGINT REFERENCES chart_of_accounts(id) ON DELETE SET NULL,
                level INTEGER NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            &[],
        )?;
        tx.execute(
            "CREATE INDEX idx_chart_of_accounts_parent_id ON chart_of_accounts(parent_id)",
            &[],
        )?;
        Ok(())
    }));
}
