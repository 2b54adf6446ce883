use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use saltbox::{
    CredentialService, EngineKind, EngineOptions, HashScheme, MemoryEngine, RemoteEngine,
    RemoteEngineOptions, Request, SchemeAlgorithm, Secret, ServiceError, StandardLogic,
    StorageEngine, StorageServer, UpdateOutcome, build_service, channel, open_engine,
};

const FAST: HashScheme = HashScheme::argon2id(8, 1, 1);
const LEGACY: HashScheme = HashScheme::new(SchemeAlgorithm::Argon2i, 8, 1, 1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service(engine: Arc<dyn StorageEngine>) -> Result<CredentialService> {
    Ok(build_service(Arc::new(StandardLogic::new(FAST)), engine)?)
}

async fn stored_digest(engine: &dyn StorageEngine, owner: &str, key: &str) -> Result<String> {
    let resp = engine.exchange(Request::verify(owner, key)).await?;
    resp.into_digest()
        .ok_or_else(|| anyhow::anyhow!("verify response carried no digest"))
}

async fn lifecycle(service: &CredentialService) -> Result<()> {
    let d1 = service.create("svc1", "alice", "p@ss").await?;
    assert!(service.verify("svc1", "alice", "p@ss").await?);
    assert!(!service.verify("svc1", "alice", "wrong").await?);

    let UpdateOutcome::Updated(d2) = service.update("svc1", "alice", "p@ss", "newpass").await?
    else {
        anyhow::bail!("update with the current secret was refused");
    };
    assert_ne!(d1, d2);
    assert!(!service.verify("svc1", "alice", "p@ss").await?);
    assert!(service.verify("svc1", "alice", "newpass").await?);

    assert!(
        service
            .delete("svc1", "alice", Some(Secret::from("newpass")))
            .await?
    );
    assert!(!service.verify("svc1", "alice", "newpass").await?);
    Ok(())
}

#[tokio::test]
async fn lifecycle_in_memory() -> Result<()> {
    init_tracing();
    lifecycle(&service(Arc::new(MemoryEngine::default()))?).await
}

#[tokio::test]
async fn lifecycle_in_sqlite() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = open_engine(EngineOptions {
        kind: EngineKind::Sqlite,
        data_dir: dir.path().to_path_buf(),
    })
    .await?;
    lifecycle(&service(engine)?).await?;
    assert!(dir.path().join("saltbox.sqlite").exists());
    Ok(())
}

#[tokio::test]
async fn lifecycle_over_remote_engine() -> Result<()> {
    init_tracing();
    let (client, server) = channel(16);
    let handle = StorageServer::spawn(Arc::new(MemoryEngine::default()), server);
    let remote = RemoteEngine::new(client, RemoteEngineOptions::default());

    let service = service(Arc::new(remote))?;
    lifecycle(&service).await?;

    drop(service);
    handle.await??;
    Ok(())
}

#[tokio::test]
async fn verify_is_repeatable_and_never_fails_on_mismatch() -> Result<()> {
    init_tracing();
    let service = service(Arc::new(MemoryEngine::default()))?;
    service.create("svc1", "alice", "p@ss").await?;

    for _ in 0..3 {
        assert!(service.verify("svc1", "alice", "p@ss").await?);
    }
    for wrong in ["", "p@s", "p@ss ", "P@SS"] {
        assert!(!service.verify("svc1", "alice", wrong).await?);
    }
    assert!(!service.verify("svc1", "nobody", "p@ss").await?);
    assert!(!service.verify("svc2", "alice", "p@ss").await?);
    Ok(())
}

#[tokio::test]
async fn duplicate_create_is_an_error() -> Result<()> {
    init_tracing();
    let service = service(Arc::new(MemoryEngine::default()))?;
    let d1 = service.create("svc1", "alice", "p@ss").await?;

    let err = service.create("svc1", "alice", "other").await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateRecord { .. }));
    assert_eq!(
        stored_digest(service.engine().as_ref(), "svc1", "alice").await?,
        d1
    );
    Ok(())
}

#[tokio::test]
async fn wrong_secret_cannot_update_or_delete() -> Result<()> {
    init_tracing();
    let service = service(Arc::new(MemoryEngine::default()))?;
    let d1 = service.create("svc1", "alice", "p@ss").await?;

    let outcome = service.update("svc1", "alice", "wrong", "hijack").await?;
    assert_eq!(outcome, UpdateOutcome::Unauthorized);
    assert!(
        !service
            .delete("svc1", "alice", Some(Secret::from("wrong")))
            .await?
    );

    assert_eq!(
        stored_digest(service.engine().as_ref(), "svc1", "alice").await?,
        d1
    );
    assert!(service.verify("svc1", "alice", "p@ss").await?);
    assert!(!service.verify("svc1", "alice", "hijack").await?);
    Ok(())
}

#[tokio::test]
async fn verify_moves_stale_digest_to_preferred_scheme() -> Result<()> {
    init_tracing();
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::default());
    let legacy = build_service(Arc::new(StandardLogic::new(LEGACY)), engine.clone())?;
    let current = service(engine.clone())?;

    let old = legacy.create("svc1", "alice", "p@ss").await?;
    legacy.create("svc1", "bob", "hunter2").await?;
    assert_eq!(HashScheme::from_digest(&old)?, LEGACY);

    // Verifies against the digest's own scheme.
    assert!(current.verify("svc1", "alice", "p@ss").await?);
    let upgraded = stored_digest(engine.as_ref(), "svc1", "alice").await?;
    assert_ne!(upgraded, old);
    assert_eq!(HashScheme::from_digest(&upgraded)?, FAST);
    assert!(current.verify("svc1", "alice", "p@ss").await?);
    assert_eq!(stored_digest(engine.as_ref(), "svc1", "alice").await?, upgraded);

    // The superseded digest still checks out on its own.
    assert!(HashScheme::matches(&old, b"p@ss")?);

    // Records not re-verified keep their legacy digest.
    let untouched = stored_digest(engine.as_ref(), "svc1", "bob").await?;
    assert_eq!(HashScheme::from_digest(&untouched)?, LEGACY);
    assert!(legacy.verify("svc1", "bob", "hunter2").await?);
    Ok(())
}

#[tokio::test]
async fn ownerless_delete_needs_an_authorizer() -> Result<()> {
    init_tracing();
    let engine: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::default());
    let plain = service(engine.clone())?;
    plain.create("svc1", "alice", "p@ss").await?;
    plain.create("svc1", "bob", "hunter2").await?;

    let err = plain.delete("svc1", "alice", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized { .. }));

    let gated = build_service(
        Arc::new(StandardLogic::new(FAST).with_authorizer(Arc::new(
            |_owner: &str, key: &str| key == "alice",
        ))),
        engine.clone(),
    )?;
    let err = gated.delete("svc1", "bob", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized { .. }));
    assert!(plain.verify("svc1", "bob", "hunter2").await?);

    assert!(gated.delete("svc1", "alice", None).await?);
    assert!(!plain.verify("svc1", "alice", "p@ss").await?);

    let err = gated.delete("svc1", "alice", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::RecordNotFound { .. }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_have_one_winner() -> Result<()> {
    init_tracing();
    let service = service(Arc::new(MemoryEngine::default()))?;
    service.create("svc1", "alice", "p@ss").await?;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let next = format!("next-{i}");
            let outcome = service.update("svc1", "alice", "p@ss", next.as_str()).await;
            (next, outcome)
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        let (next, outcome) = task.await?;
        if let UpdateOutcome::Updated(_) = outcome? {
            winners.push(next);
        }
    }
    assert_eq!(winners.len(), 1);
    assert!(service.verify("svc1", "alice", winners[0].as_str()).await?);
    assert!(!service.verify("svc1", "alice", "p@ss").await?);
    Ok(())
}
