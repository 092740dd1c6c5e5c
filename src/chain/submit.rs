//! Submission of signed transactions, mapped onto the service error
//! taxonomy.

use tracing::{debug, error};

use super::{ChainHandle, SubmitResult, TxOutcome};
use crate::error::{ServiceError, ServiceResult};
use crate::transaction::Transaction;

impl ChainHandle {
    async fn submit(&self, tx: &Transaction, pre_exec: bool) -> ServiceResult<Option<TxOutcome>> {
        let client = self.client().await?;
        let response = client
            .send_raw_transaction(&tx.to_hex(), pre_exec, !pre_exec)
            .await?;
        if !response.is_ok() {
            error!(
                tx = %tx.hash_hex(),
                pre_exec,
                code = response.error,
                desc = %response.desc,
                "node rejected transaction"
            );
            return Err(ServiceError::TransactionError(format!(
                "node error {}: {}",
                response.error, response.desc
            )));
        }
        Ok(response.result.and_then(|r| match r {
            SubmitResult::Outcome(outcome) => Some(outcome),
            SubmitResult::Hash(_) => None,
        }))
    }

    /// Dry-run `tx`. The VM state is returned unchecked so callers can
    /// decide what a failed dry run means for them.
    pub async fn pre_execute(&self, tx: &Transaction) -> ServiceResult<TxOutcome> {
        let outcome = self
            .submit(tx, true)
            .await?
            .ok_or_else(|| ServiceError::internal("pre-execution returned no outcome"))?;
        debug!(tx = %tx.hash_hex(), state = outcome.state, gas = outcome.gas, "pre-executed");
        Ok(outcome)
    }

    /// Commit `tx` and wait until it is in a block.
    ///
    /// A VM fault is [`ServiceError::TransactionFailed`]; nothing about the
    /// transaction is assumed when the node rejects it.
    pub async fn commit(&self, tx: &Transaction) -> ServiceResult<TxOutcome> {
        let outcome = self
            .submit(tx, false)
            .await?
            .ok_or_else(|| ServiceError::internal("commit returned no outcome"))?;
        if !outcome.succeeded() {
            error!(tx = %tx.hash_hex(), state = outcome.state, "transaction failed on chain");
            return Err(ServiceError::TransactionFailed);
        }
        debug!(tx = %tx.hash_hex(), gas = outcome.gas, "committed");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::testing::ScriptedChain;
    use crate::chain::ChainResponse;
    use crate::config::OntologyConfig;
    use crate::crypto::Keypair;

    fn setup() -> (Arc<ScriptedChain>, ChainHandle, Transaction) {
        let fake = Arc::new(ScriptedChain::default());
        let handle = ChainHandle::with_client(OntologyConfig::default(), fake.clone());
        let kp = Keypair::generate();
        let mut tx = Transaction::invoke(vec![0x00], 500, 20_000, kp.address());
        tx.sign(&kp);
        (fake, handle, tx)
    }

    #[tokio::test]
    async fn test_commit_success() {
        let (fake, handle, tx) = setup();
        fake.push_success(100, vec![]);
        let outcome = handle.commit(&tx).await.unwrap();
        assert_eq!(outcome.gas, 100);
        let sent = fake.submitted();
        assert!(!sent[0].pre_exec);
        assert!(sent[0].wait_notify);
    }

    #[tokio::test]
    async fn test_commit_vm_failure() {
        let (fake, handle, tx) = setup();
        fake.push_vm_failure();
        assert_eq!(handle.commit(&tx).await, Err(ServiceError::TransactionFailed));
    }

    #[tokio::test]
    async fn test_node_error_and_transport() {
        let (fake, handle, tx) = setup();
        fake.push_node_error(43001).push_transport_failure();
        assert!(matches!(
            handle.commit(&tx).await,
            Err(ServiceError::TransactionError(_))
        ));
        assert!(matches!(
            handle.pre_execute(&tx).await,
            Err(ServiceError::TransactionError(_))
        ));
    }

    #[tokio::test]
    async fn test_hash_only_reply_is_internal() {
        let (fake, handle, tx) = setup();
        fake.push_reply(Ok(ChainResponse::ok(SubmitResult::Hash("ab".into()))));
        assert!(matches!(handle.commit(&tx).await, Err(ServiceError::Internal(_))));
    }

    #[tokio::test]
    async fn test_pre_execute_returns_failed_state() {
        let (fake, handle, tx) = setup();
        fake.push_vm_failure();
        let outcome = handle.pre_execute(&tx).await.unwrap();
        assert!(!outcome.succeeded());
        assert!(fake.submitted()[0].pre_exec);
    }
}
