use super::packets::{check_password_failure, check_password_success, LoginFailure};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::interop::message::ClientAuth;
use crate::protocol::event::{EventContext, PacketEvent, Validation};
use crate::protocol::session::{AccountSession, ClientSession, LoginStatus, SecondaryPassword, Stage};
use crate::storage::{AccountRow, CredentialCheck};
use async_trait::async_trait;
use tracing::{debug, info};

/// Username/password login.
#[derive(Debug, Default)]
pub struct CheckPassword {
    username: String,
    password: String,
    account: Option<AccountRow>,
}

impl CheckPassword {
    pub fn create() -> Box<dyn PacketEvent> {
        Box::new(Self::default())
    }
}

#[async_trait]
impl PacketEvent for CheckPassword {
    fn validate(&mut self, packet: &mut Packet, ctx: &EventContext<'_>) -> Result<Validation> {
        self.username = packet.read_string()?;
        self.password = packet.read_string()?;

        if ctx.session.stage != Stage::Connected {
            return Ok(Validation::Drop);
        }

        let process = ctx.process;
        let account = match process
            .storage
            .check_credentials(&self.username, &self.password)?
        {
            CredentialCheck::Valid(account) => account,
            CredentialCheck::UnknownAccount => {
                debug!(username = %self.username, "Login for unknown account");
                return Ok(Validation::Deny(check_password_failure(LoginFailure::NotRegistered)));
            }
            CredentialCheck::WrongPassword => {
                debug!(username = %self.username, "Login with wrong password");
                return Ok(Validation::Deny(check_password_failure(LoginFailure::WrongPassword)));
            }
            CredentialCheck::Blocked => {
                debug!(username = %self.username, "Login for blocked account");
                return Ok(Validation::Deny(check_password_failure(LoginFailure::Blocked)));
            }
        };

        if process.sessions.is_account_online(account.id)? {
            debug!(username = %self.username, account = account.id, "Account already logged in");
            return Ok(Validation::Deny(check_password_failure(LoginFailure::AlreadyLoggedIn)));
        }

        self.account = Some(account);
        Ok(Validation::Accept)
    }

    async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
        let account = self
            .account
            .take()
            .ok_or_else(|| ProtocolError::Custom("Login applied without validation".into()))?;
        let process = ctx.process;
        let session = &mut *ctx.session;

        process.sessions.bind_account(account.id, session.id)?;
        process
            .storage
            .record_login_address(account.id, session.remote_ip())?;

        session.secondary_password = SecondaryPassword::from_account(
            process.config.login.secondary_password_enabled,
            account.secondary_password.as_deref(),
        );
        session.account = Some(AccountSession {
            id: account.id,
            username: account.username.clone(),
        });
        session.advance(Stage::AuthenticatedAccount)?;
        session.login_status = LoginStatus::LoggedIn;

        info!(
            connection = session.id,
            account = account.id,
            username = %account.username,
            remote = %session.remote,
            "Account logged in"
        );

        if let Some(update) = ClientAuth::for_session(session, LoginStatus::LoggedIn) {
            process.report_client(update).await;
        }

        let reply = check_password_success(&account, &ctx.session.secondary_password);
        ctx.write(reply);
        Ok(())
    }

    fn on_fault(&mut self, error: &ProtocolError, _session: &ClientSession) -> Option<Packet> {
        // Lost a race with another connection logging into the same account
        match error {
            ProtocolError::AlreadyRegistered(_) => {
                Some(check_password_failure(LoginFailure::AlreadyLoggedIn))
            }
            _ => None,
        }
    }
}
