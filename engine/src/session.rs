//! The session/auth state machine.
//!
//! Reconciles the available credential sources into one authenticated
//! identity and owns the setup-redirect loop guard. All flags that drove the
//! original flow live as explicit fields here; the persisted [`SessionRecord`]
//! is only a durability layer, written through [`SessionStore`] after each
//! mutation.
//!
//! # Credential reconciliation
//!
//! Sources are polled in a fixed priority order, first success wins:
//!
//! 1. An active login (identity handed over by a fresh `login` call).
//! 2. An environment token (`LUMEN_API_TOKEN`), when set.
//! 3. A natively injected token (mobile-shell bridge), consumed at most once
//!    per injection.
//! 4. The persisted token from the session record.
//!
//! A token-bearing source whose remote identity fetch fails *transiently*
//! still succeeds, downgraded to a locally-synthesized fallback identity; a
//! definitive auth failure (401-shaped) discards the source and, for the
//! persisted token, clears it from the record.

use chrono::{DateTime, Utc};

use lumen_client::{ApiClient, ClientError};
use lumen_types::{
    AuthToken, NativeInjection, SessionIdentity, SessionSettings, UserRole,
};

use crate::store::{EphemeralStore, SelectedAgent, SessionRecord, SessionStore};

/// Where the front end currently is, as far as the machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRoute {
    /// Explicitly unauthenticated surfaces (login, password reset). The
    /// machine stays out of the way: no remote calls, no redirects.
    Public,
    /// The setup wizard itself.
    Setup,
    /// Everything else.
    Protected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Unauthenticated,
    /// Checking persisted/injected credentials.
    Restoring,
    Authenticated(SessionIdentity),
    /// Navigating to the setup wizard; terminal for this machine instance.
    RedirectingToSetup,
}

/// One candidate credential, in reconciliation priority order.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    ActiveLogin(SessionIdentity),
    /// `LUMEN_API_TOKEN`; never persisted, never clears the record on
    /// rejection.
    Environment(AuthToken),
    NativeToken(AuthToken),
    PersistedToken(AuthToken),
}

/// Outcome of a setup-redirect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Navigate to the setup wizard.
    Proceed,
    /// Loop guard tripped (or already on the setup route); stay put.
    Suppressed,
}

/// Marker key for consuming a native injection at most once.
const NATIVE_INJECTION_MARKER: &str = "native-injection-handled";

pub struct SessionMachine {
    phase: SessionPhase,
    record: SessionRecord,
    ephemeral: EphemeralStore,
    settings: SessionSettings,
    /// Durability layer; `None` keeps the machine memory-only (tests, or a
    /// host without a writable data dir).
    store: Option<SessionStore>,
    env_token: Option<AuthToken>,
    last_setup_redirect: Option<DateTime<Utc>>,
    /// Most recent reconciled identity, kept so a guarded redirect can fall
    /// back to `Authenticated` instead of stranding the session.
    last_identity: Option<SessionIdentity>,
}

impl SessionMachine {
    #[must_use]
    pub fn new(settings: SessionSettings, store: Option<SessionStore>) -> Self {
        let record = store
            .as_ref()
            .map_or_else(SessionRecord::new, SessionStore::load);
        Self {
            phase: SessionPhase::Unauthenticated,
            record,
            ephemeral: EphemeralStore::new(),
            settings,
            store,
            env_token: None,
            last_setup_redirect: None,
            last_identity: None,
        }
    }

    /// Try a `LUMEN_API_TOKEN`-style token ahead of injected/persisted ones.
    #[must_use]
    pub fn with_env_token(mut self, token: Option<AuthToken>) -> Self {
        self.env_token = token;
        self
    }

    #[must_use]
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    #[must_use]
    pub fn identity(&self) -> Option<&SessionIdentity> {
        match &self.phase {
            SessionPhase::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    #[must_use]
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// The priority-ordered credential sources available right now.
    ///
    /// A native injection is consumed at most once per machine; its token is
    /// also written into the record so later plain restores can use it.
    fn candidate_sources(
        &mut self,
        active: Option<SessionIdentity>,
        native: Option<&NativeInjection>,
    ) -> Vec<CredentialSource> {
        let mut sources = Vec::new();

        if let Some(identity) = active {
            sources.push(CredentialSource::ActiveLogin(identity));
        }

        if let Some(token) = &self.env_token {
            sources.push(CredentialSource::Environment(token.clone()));
        }

        if let Some(injection) = native
            && let Some(token) = injection.usable_token()
            && self.ephemeral.mark_once(NATIVE_INJECTION_MARKER)
        {
            self.record.native_auth_seen = true;
            self.record.auth_token = Some(token.clone());
            self.persist();
            sources.push(CredentialSource::NativeToken(token.clone()));
        }

        if let Some(token) = &self.record.auth_token {
            sources.push(CredentialSource::PersistedToken(token.clone()));
        }

        sources
    }

    /// Reconcile credentials on mount/navigation.
    ///
    /// On a [`SessionRoute::Public`] route this is a no-op that parks the
    /// machine in `Unauthenticated` without any remote call. Otherwise each
    /// candidate source is tried in order; the phase afterward is either
    /// `Authenticated` or `Unauthenticated`. Failures never escape: they are
    /// folded into the resulting phase.
    pub async fn restore(
        &mut self,
        client: &ApiClient,
        route: SessionRoute,
        native: Option<&NativeInjection>,
    ) {
        self.reconcile(client, route, None, native).await;
    }

    /// Reconcile with an already-known in-memory identity at the head of the
    /// source list (e.g. a login completed elsewhere in the host).
    pub async fn restore_with_active(
        &mut self,
        client: &ApiClient,
        route: SessionRoute,
        active: SessionIdentity,
        native: Option<&NativeInjection>,
    ) {
        self.reconcile(client, route, Some(active), native).await;
    }

    async fn reconcile(
        &mut self,
        client: &ApiClient,
        route: SessionRoute,
        active: Option<SessionIdentity>,
        native: Option<&NativeInjection>,
    ) {
        if route == SessionRoute::Public {
            self.phase = SessionPhase::Unauthenticated;
            return;
        }

        self.phase = SessionPhase::Restoring;

        let sources = self.candidate_sources(active, native);
        for source in sources {
            // An environment token lives outside the record; its rejection
            // must not clear a possibly-valid persisted token.
            let clears_record = matches!(
                source,
                CredentialSource::NativeToken(_) | CredentialSource::PersistedToken(_)
            );
            match self.try_source(client, source).await {
                SourceOutcome::Authenticated(identity) => {
                    self.last_identity = Some(identity.clone());
                    self.phase = SessionPhase::Authenticated(identity);
                    return;
                }
                SourceOutcome::Definitive => {
                    // 401-shaped: the token is dead. Drop it from the record
                    // so the next restore does not retry it.
                    if clears_record {
                        self.record.auth_token = None;
                        self.persist();
                    }
                }
            }
        }

        self.phase = SessionPhase::Unauthenticated;
    }

    async fn try_source(&self, client: &ApiClient, source: CredentialSource) -> SourceOutcome {
        let token = match source {
            CredentialSource::ActiveLogin(identity) => {
                return SourceOutcome::Authenticated(identity);
            }
            CredentialSource::Environment(token)
            | CredentialSource::NativeToken(token)
            | CredentialSource::PersistedToken(token) => token,
        };

        let authed = client.clone().with_token(token.clone());
        match authed.auth().current_user().await {
            Ok(profile) => SourceOutcome::Authenticated(SessionIdentity {
                user_id: profile.user_id,
                role: profile.role,
                permissions: profile.permissions,
                token,
            }),
            Err(e) if e.is_definitive_auth_failure() => {
                tracing::info!(error = %e, "Stored token rejected, discarding");
                SourceOutcome::Definitive
            }
            Err(e) => {
                // Transient: keep the session alive on a synthesized identity
                // rather than forcing a logout over a network blip.
                tracing::warn!(error = %e, "Identity fetch failed, using fallback identity");
                SourceOutcome::Authenticated(SessionIdentity::fallback(token))
            }
        }
    }

    /// A fresh interactive login succeeded.
    pub fn login_succeeded(&mut self, identity: SessionIdentity) {
        self.record.auth_token = Some(identity.token.clone());
        self.persist();
        self.last_identity = Some(identity.clone());
        self.phase = SessionPhase::Authenticated(identity);
    }

    /// Explicit logout: clear the identity and the persisted token.
    pub fn logout(&mut self) {
        self.record.auth_token = None;
        self.persist();
        self.last_identity = None;
        self.phase = SessionPhase::Unauthenticated;
    }

    /// React to an operation failure: a definitive auth error clears the
    /// session; anything else leaves the phase alone.
    pub fn observe_error(&mut self, error: &ClientError) {
        if error.is_definitive_auth_failure() {
            self.logout();
        }
    }

    /// The server reported that setup is required.
    ///
    /// Applies the loop guard: if a setup redirect already happened within
    /// the guard window, the attempt is suppressed and the machine stays (or
    /// best-effort lands) in `Authenticated` instead of re-entering the
    /// redirect. On `Proceed` the machine moves to `RedirectingToSetup`.
    pub fn observe_setup_required(
        &mut self,
        route: SessionRoute,
        now: DateTime<Utc>,
    ) -> RedirectDecision {
        if route == SessionRoute::Setup {
            return RedirectDecision::Suppressed;
        }

        if let Some(last) = self.last_setup_redirect {
            let window = chrono::Duration::from_std(self.settings.redirect_guard_window())
                .unwrap_or_else(|_| chrono::Duration::seconds(5));
            if now.signed_duration_since(last) < window {
                tracing::warn!("Setup redirect suppressed by loop guard");
                // Best effort: land back on the last known identity instead
                // of stranding the session mid-redirect.
                if !matches!(self.phase, SessionPhase::Authenticated(_))
                    && let Some(identity) = self.last_identity.clone()
                {
                    self.phase = SessionPhase::Authenticated(identity);
                }
                return RedirectDecision::Suppressed;
            }
        }

        self.last_setup_redirect = Some(now);
        self.phase = SessionPhase::RedirectingToSetup;
        RedirectDecision::Proceed
    }

    /// Record the server-side setup completion hint.
    pub fn setup_completed(&mut self) {
        self.record.setup_complete = true;
        self.persist();
    }

    /// Remember the agent subsequent messages go to.
    pub fn select_agent(&mut self, agent: SelectedAgent) {
        self.record.selected_agent = Some(agent);
        self.persist();
    }

    #[must_use]
    pub fn selected_agent(&self) -> Option<&SelectedAgent> {
        self.record.selected_agent.as_ref()
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(&self.record)
        {
            tracing::warn!(error = %e, "Failed to persist session record");
        }
    }
}

enum SourceOutcome {
    Authenticated(SessionIdentity),
    /// Definitive auth failure: discard this credential.
    Definitive,
}

/// True for a session running on a synthesized fallback identity (the remote
/// identity fetch failed non-definitively). Such sessions hold a token but no
/// verified role or permissions.
#[must_use]
pub fn is_degraded(identity: &SessionIdentity) -> bool {
    identity.is_fallback() && identity.role == UserRole::Guest
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use lumen_types::{AuthToken, NativeInjection, SessionIdentity, SessionSettings, UserRole};

    use super::{RedirectDecision, SessionMachine, SessionPhase, SessionRoute};

    fn machine() -> SessionMachine {
        SessionMachine::new(SessionSettings::default(), None)
    }

    fn identity(token: &str) -> SessionIdentity {
        SessionIdentity {
            user_id: "u1".to_owned(),
            role: UserRole::Member,
            permissions: vec!["chat".to_owned()],
            token: AuthToken::new(token).unwrap(),
        }
    }

    #[test]
    fn login_and_logout_transition_phase_and_record() {
        let mut machine = machine();
        machine.login_succeeded(identity("tok-1"));
        assert!(matches!(machine.phase(), SessionPhase::Authenticated(_)));
        assert!(machine.record().auth_token.is_some());

        machine.logout();
        assert_eq!(machine.phase(), &SessionPhase::Unauthenticated);
        assert!(machine.record().auth_token.is_none());
    }

    #[test]
    fn redirect_guard_allows_one_navigation_per_window() {
        let mut machine = machine();
        machine.login_succeeded(identity("tok-1"));

        let t0 = Utc::now();
        assert_eq!(
            machine.observe_setup_required(SessionRoute::Protected, t0),
            RedirectDecision::Proceed
        );
        assert_eq!(machine.phase(), &SessionPhase::RedirectingToSetup);

        // A second trigger 2s later (inside the 5s window) is suppressed and
        // the machine lands back on the prior identity.
        assert_eq!(
            machine.observe_setup_required(SessionRoute::Protected, t0 + Duration::seconds(2)),
            RedirectDecision::Suppressed
        );
        assert!(matches!(machine.phase(), SessionPhase::Authenticated(_)));
        // Past the window, redirects flow again.
        assert_eq!(
            machine.observe_setup_required(SessionRoute::Protected, t0 + Duration::seconds(6)),
            RedirectDecision::Proceed
        );
    }

    #[test]
    fn setup_route_never_redirects() {
        let mut machine = machine();
        assert_eq!(
            machine.observe_setup_required(SessionRoute::Setup, Utc::now()),
            RedirectDecision::Suppressed
        );
    }

    #[test]
    fn proceed_moves_machine_to_redirecting() {
        let mut machine = machine();
        machine.observe_setup_required(SessionRoute::Protected, Utc::now());
        assert_eq!(machine.phase(), &SessionPhase::RedirectingToSetup);
    }

    #[tokio::test]
    async fn public_route_skips_all_remote_work() {
        // Unreachable host: a remote call would surface as a slow fallback
        // identity; the public route must park unauthenticated immediately.
        let settings = lumen_types::ApiSettings::new(
            "https://lumen.invalid",
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let client = lumen_client::ApiClient::new(settings).unwrap();

        let mut machine = machine();
        machine.restore(&client, SessionRoute::Public, None).await;
        assert_eq!(machine.phase(), &SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn native_injection_degrades_to_fallback_when_host_unreachable() {
        let settings = lumen_types::ApiSettings::new(
            "https://lumen.invalid",
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let client = lumen_client::ApiClient::new(settings).unwrap();

        let injection = NativeInjection {
            ready: true,
            token: Some(AuthToken::new("tok-native").unwrap()),
            user_id: Some("u-native".to_owned()),
            role: Some(UserRole::Member),
        };

        let mut machine = machine();
        machine
            .restore(&client, SessionRoute::Protected, Some(&injection))
            .await;

        // Unreachable host => transient failure => fallback identity from the
        // injected token rather than a logout.
        match machine.phase() {
            SessionPhase::Authenticated(identity) => {
                assert!(identity.is_fallback());
                assert_eq!(identity.token.expose_secret(), "tok-native");
            }
            other => panic!("expected authenticated fallback, got {other:?}"),
        }
        assert!(machine.record().native_auth_seen);
        // The injected token was persisted for later plain restores.
        assert!(machine.record().auth_token.is_some());
    }
}
