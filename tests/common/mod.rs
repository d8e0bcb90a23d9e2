#![allow(dead_code)]

use std::sync::Arc;

use case_lifecycle::{
    config::Config,
    gateway::Principal,
    identity::AdvisorProfile,
    service::CaseService,
};
use tempfile::{TempDir, tempdir};

// Sled uses file-based locking, so every test gets its own database in a
// temp directory. Keep the TempDir alive for as long as the service.
pub struct Harness {
    pub dir: TempDir,
    pub service: CaseService,
}

pub fn harness(name: &str) -> anyhow::Result<Harness> {
    let dir = tempdir()?;
    let db = Arc::new(sled::open(dir.path().join(name))?);
    let service = CaseService::new(db, &Config::default())?;
    Ok(Harness { dir, service })
}

pub fn user(service: &CaseService, email: &str) -> anyhow::Result<Principal> {
    let record = service.identities().register_user(email, "password123")?;
    Ok(Principal::from(&record))
}

pub fn advisor(service: &CaseService, email: &str, name: &str, firm: &str) -> anyhow::Result<Principal> {
    let profile = AdvisorProfile {
        name: name.to_string(),
        firm: Some(firm.to_string()),
        bio: Some(format!("{name} has twenty years of practice")),
        specialisms: vec!["retirement".to_string()],
        ..AdvisorProfile::default()
    };
    let record = service
        .identities()
        .register_advisor(email, "password123", profile)?;
    let record = service.identities().approve_advisor(&record.id)?;
    Ok(Principal::from(&record))
}

pub fn admin(service: &CaseService) -> anyhow::Result<Principal> {
    let record = service.bootstrap_admin("admin@example.com", "password123")?;
    Ok(Principal::from(&record))
}
