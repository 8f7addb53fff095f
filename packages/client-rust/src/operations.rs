//! Operations API surface: listing, retrieving, waiting on, and deleting
//! server operations by identifier.

use std::collections::HashMap;

use reqwest::Method;

use crate::client::Client;
use crate::error::Result;

impl Client {
    /// Lists the identifiers of every live operation.
    ///
    /// # Errors
    ///
    /// Surfaces transport and envelope errors.
    pub async fn list_operation_ids(&self) -> Result<Vec<String>> {
        let (envelope, _etag) = self
            .call_api(Method::GET, &opflow_core::path(&["operations"]), &[], None, None)
            .await?;

        let groups: HashMap<String, Vec<String>> = envelope.metadata_as()?;
        let mut ids: Vec<String> = groups
            .into_values()
            .flatten()
            .filter_map(|url| url.rsplit('/').next().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Lists every live operation as a full render.
    ///
    /// # Errors
    ///
    /// Surfaces transport and envelope errors.
    pub async fn list_operations(&self) -> Result<Vec<opflow_core::Operation>> {
        let (envelope, _etag) = self
            .call_api(
                Method::GET,
                &opflow_core::path(&["operations"]),
                &[("recursion", "1")],
                None,
                None,
            )
            .await?;

        let groups: HashMap<String, Vec<opflow_core::Operation>> = envelope.metadata_as()?;
        Ok(groups.into_values().flatten().collect())
    }

    /// Fetches one operation's current render and its ETag.
    ///
    /// # Errors
    ///
    /// 404 once the operation finished or never existed.
    pub async fn retrieve_operation_by_id(
        &self,
        id: &str,
    ) -> Result<(opflow_core::Operation, String)> {
        let (envelope, etag) = self
            .call_api(
                Method::GET,
                &opflow_core::path(&["operations", id]),
                &[],
                None,
                None,
            )
            .await?;
        Ok((envelope.metadata_as_operation()?, etag))
    }

    /// Blocks server-side until the operation is final and returns its
    /// render. `timeout` follows the wait endpoint's contract: seconds,
    /// `-1` for forever, `0` for an immediate snapshot.
    ///
    /// # Errors
    ///
    /// Surfaces the server's timeout error alongside the usual ones.
    pub async fn wait_for_operation(
        &self,
        id: &str,
        timeout: i64,
    ) -> Result<opflow_core::Operation> {
        let (envelope, _etag) = self
            .call_api(
                Method::GET,
                &opflow_core::path(&["operations", id, "wait"]),
                &[("timeout", &timeout.to_string())],
                None,
                None,
            )
            .await?;
        Ok(envelope.metadata_as_operation()?)
    }

    /// Requests cancellation of a running operation.
    ///
    /// # Errors
    ///
    /// Surfaces the server's refusal (e.g. the operation is not running).
    pub async fn delete_operation(&self, id: &str) -> Result<()> {
        self.call_api(
            Method::DELETE,
            &opflow_core::path(&["operations", id]),
            &[],
            None,
            None,
        )
        .await?;
        Ok(())
    }
}
