//! Transaction helpers.
//!
//! A [`Session`](crate::Session) has one transaction slot, driven with
//! [`begin_transaction`](crate::Session::begin_transaction),
//! [`commit`](crate::Session::commit) and
//! [`rollback`](crate::Session::rollback). The [`transaction!`](crate::transaction)
//! macro wraps a block in that cycle.

/// Runs the given block inside a session transaction.
///
/// - Begins a transaction on `$session`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the block's error.
///
/// The block must evaluate to `fluentdb::DbResult<T>`, and the macro must
/// be used inside an async function returning a compatible `Result`.
///
/// # Example
///
/// ```ignore
/// fluentdb::transaction!(session, {
///     session.table("users").insert(record! { "name" => "Jane" }).await?;
///     session.table("audit").insert(record! { "event" => "signup" }).await?;
///     Ok::<(), fluentdb::DbError>(())
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($session:expr, $body:block) => {{
        let __fluentdb_session = &$session;
        __fluentdb_session.begin_transaction().await?;

        let __fluentdb_tx_body_result = async { $body }.await;
        match __fluentdb_tx_body_result {
            Ok(value) => {
                __fluentdb_session.commit().await?;
                Ok(value)
            }
            Err(error) => match __fluentdb_session.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Transaction(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
