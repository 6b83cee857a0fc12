//! # Login Codes
//!
//! Storage for one-time login codes. Generation, delivery and verification
//! belong to the caller; the store only keeps the record and its attempt
//! counter.

use crate::entity_store::load_version;
use crate::locks::LockKey;
use crate::storage::{StoreRead, Table, decode, keys};
use crate::transaction::Transaction;
use crate::{AccountId, EntityId, GraphError, LoginCode, LoginId};

/// Login code queries over any consistent read state.
pub trait LoginCodeReader: StoreRead {
    fn get_login_code(
        &self,
        account_id: AccountId,
        login_id: LoginId,
    ) -> Result<Option<LoginCode>, GraphError> {
        self.read(Table::LoginCodes, &keys::login_code_key(account_id, login_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Codes issued to one user, oldest first.
    fn get_login_codes(
        &self,
        account_id: AccountId,
        user_entity_id: EntityId,
    ) -> Result<Vec<LoginCode>, GraphError> {
        let mut codes = Vec::new();
        for (_, bytes) in self.scan(Table::LoginCodes, &keys::account_prefix(account_id))? {
            let code: LoginCode = decode(&bytes)?;
            if code.user_entity_id == user_entity_id {
                codes.push(code);
            }
        }
        codes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.login_id.cmp(&b.login_id))
        });
        Ok(codes)
    }
}

impl<T: StoreRead + ?Sized> LoginCodeReader for T {}

impl Transaction<'_> {
    /// Store a new code for an existing user entity.
    pub fn create_login_code(
        &mut self,
        account_id: AccountId,
        user_entity_id: EntityId,
        login_code: impl Into<String>,
    ) -> Result<LoginCode, GraphError> {
        let login_code = login_code.into();
        if login_code.is_empty() {
            return Err(GraphError::InvalidInput("login code must not be empty".to_string()));
        }
        if load_version(&self.latest(), account_id, user_entity_id)?.is_none() {
            return Err(GraphError::NotFound(format!(
                "user entity {} in account {}",
                user_entity_id, account_id
            )));
        }

        let code = LoginCode {
            account_id,
            login_id: self.store().ids.new_login_id(),
            user_entity_id,
            login_code,
            number_of_attempts: 0,
            created_at: self.store().clock.now(),
        };
        self.put_record(
            Table::LoginCodes,
            keys::login_code_key(account_id, code.login_id),
            &code,
        )?;
        Ok(code)
    }

    /// Count one more verification attempt against a code.
    pub fn increment_login_code_attempts(
        &mut self,
        account_id: AccountId,
        login_id: LoginId,
    ) -> Result<LoginCode, GraphError> {
        self.lock(LockKey::LoginCode(account_id, login_id))?;
        let key = keys::login_code_key(account_id, login_id);
        let mut code: LoginCode = self
            .read_latest(Table::LoginCodes, &key)?
            .map(|bytes| decode(&bytes))
            .transpose()?
            .ok_or_else(|| {
                GraphError::NotFound(format!("login code {} in account {}", login_id, account_id))
            })?;
        code.number_of_attempts = code.number_of_attempts.saturating_add(1);
        self.put_record(Table::LoginCodes, key, &code)?;
        Ok(code)
    }
}
