//! CLI commands run against the loopback backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use strongbox_cli::commands::auth::AccountArgs;
use strongbox_cli::commands::secrets::{
    CreateCredentialsArgs, CreateFileArgs, CreatePaymentCardArgs, DeleteArgs, GetArgs, GetFileArgs,
};
use strongbox_cli::{dispatch, render, App, Commands};
use strongbox_client::CHUNK_SIZE;
use strongbox_core::{CallContext, FileTokenStore, TokenStore};
use strongbox_integration_tests::Backend;

async fn app(backend: &Backend, tokens: Arc<dyn TokenStore>) -> App {
    app_with_timeout(backend, tokens, Duration::from_secs(5)).await
}

async fn app_with_timeout(backend: &Backend, tokens: Arc<dyn TokenStore>, timeout: Duration) -> App {
    let session = backend.session(tokens.clone()).await;
    App::new(session.transport, tokens, CallContext::new(), timeout)
}

fn get(name: &str, version: u32) -> GetArgs {
    GetArgs {
        name: name.into(),
        secret_version: version,
    }
}

#[tokio::test]
async fn test_register_store_and_read_back() {
    let backend = Backend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    let app = app(&backend, tokens.clone()).await;

    dispatch(
        &app,
        Commands::Register(AccountArgs {
            login: "carol".into(),
            password: Some("pw".into()),
        }),
    )
    .await
    .unwrap();
    assert!(tokens.read().await.is_ok());

    dispatch(
        &app,
        Commands::CreateCredentials(CreateCredentialsArgs {
            name: "github".into(),
            login: "octocat".into(),
            password: Some("hunter2".into()),
            metadata: "work".into(),
        }),
    )
    .await
    .unwrap();
    dispatch(
        &app,
        Commands::CreatePaymentcard(CreatePaymentCardArgs {
            name: "visa".into(),
            number: Some("4111111111111111".into()),
            metadata: String::new(),
        }),
    )
    .await
    .unwrap();

    dispatch(&app, Commands::GetCredentials(get("github", 0))).await.unwrap();
    dispatch(&app, Commands::GetPaymentcard(get("visa", 1))).await.unwrap();
    dispatch(&app, Commands::List).await.unwrap();

    assert_eq!(backend.versions("carol", "github"), 1);
    assert_eq!(backend.versions("carol", "visa"), 1);
}

#[tokio::test]
async fn test_file_upload_and_download() {
    let backend = Backend::start().await;
    let token = backend.add_user("dave", "pw");
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    tokens.write(&token.into()).await.unwrap();
    let app = app(&backend, tokens).await;

    let source = dir.path().join("report.pdf");
    let content: Vec<u8> = (0..700_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&source, &content).unwrap();

    dispatch(
        &app,
        Commands::CreateFile(CreateFileArgs {
            name: "docs/report.pdf".into(),
            file: source,
            metadata: String::new(),
        }),
    )
    .await
    .unwrap();

    let output = dir.path().join("downloaded.pdf");
    dispatch(
        &app,
        Commands::GetFile(GetFileArgs {
            secret: get("docs/report.pdf", 0),
            output: Some(output.clone()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), content);
}

#[tokio::test]
async fn test_failed_download_leaves_no_file() {
    let backend = Backend::start().await;
    let token = backend.add_user("erin", "pw");
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    tokens.write(&token.into()).await.unwrap();
    let app = app(&backend, tokens).await;

    let output: PathBuf = dir.path().join("missing.bin");
    let err = dispatch(
        &app,
        Commands::GetFile(GetFileArgs {
            secret: get("missing.bin", 0),
            output: Some(output.clone()),
        }),
    )
    .await
    .unwrap_err();

    assert!(render::failure(&err).starts_with("Not found"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_interrupted_download_keeps_existing_output() {
    let backend = Backend::start().await;
    let token = backend.add_user("hank", "pw");
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    tokens.write(&token.into()).await.unwrap();

    let source = dir.path().join("big.bin");
    std::fs::write(&source, vec![3u8; CHUNK_SIZE * 8]).unwrap();
    let app = app(&backend, tokens.clone()).await;
    dispatch(
        &app,
        Commands::CreateFile(CreateFileArgs {
            name: "big.bin".into(),
            file: source,
            metadata: String::new(),
        }),
    )
    .await
    .unwrap();

    let downloads = dir.path().join("downloads");
    std::fs::create_dir(&downloads).unwrap();
    let output = downloads.join("big.bin");
    std::fs::write(&output, b"keep me").unwrap();

    backend.slow_downloads(Duration::from_millis(100));
    let impatient = app_with_timeout(&backend, tokens, Duration::from_millis(300)).await;
    let err = dispatch(
        &impatient,
        Commands::GetFile(GetFileArgs {
            secret: get("big.bin", 0),
            output: Some(output.clone()),
        }),
    )
    .await
    .unwrap_err();

    assert!(
        render::failure(&err).starts_with("Could not reach the server"),
        "{err:#}"
    );
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");
    assert_eq!(std::fs::read_dir(&downloads).unwrap().count(), 1);
}

#[tokio::test]
async fn test_delete_then_get_reports_not_found() {
    let backend = Backend::start().await;
    let token = backend.add_user("frank", "pw");
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    tokens.write(&token.into()).await.unwrap();
    let app = app(&backend, tokens).await;

    dispatch(
        &app,
        Commands::CreateCredentials(CreateCredentialsArgs {
            name: "github".into(),
            login: "octocat".into(),
            password: Some("pw".into()),
            metadata: String::new(),
        }),
    )
    .await
    .unwrap();

    dispatch(
        &app,
        Commands::Delete(DeleteArgs {
            name: "github".into(),
            yes: true,
        }),
    )
    .await
    .unwrap();

    let err = dispatch(&app, Commands::GetCredentials(get("github", 0)))
        .await
        .unwrap_err();
    assert_eq!(render::failure(&err), "Not found: secret 'github'");
}

#[tokio::test]
async fn test_type_mismatch_is_invalid_input() {
    let backend = Backend::start().await;
    let token = backend.add_user("gina", "pw");
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    tokens.write(&token.into()).await.unwrap();
    let app = app(&backend, tokens).await;

    dispatch(
        &app,
        Commands::CreatePaymentcard(CreatePaymentCardArgs {
            name: "visa".into(),
            number: Some("4111".into()),
            metadata: String::new(),
        }),
    )
    .await
    .unwrap();

    let err = dispatch(&app, Commands::GetCredentials(get("visa", 0)))
        .await
        .unwrap_err();
    assert_eq!(
        render::failure(&err),
        "Invalid input: secret 'visa' holds payment_card, not credentials"
    );
}

#[tokio::test]
async fn test_commands_without_login_are_unauthenticated() {
    let backend = Backend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    let app = app(&backend, tokens).await;

    let err = dispatch(&app, Commands::List).await.unwrap_err();
    assert!(render::failure(&err).starts_with("Not authenticated"));
    assert!(backend.requests().is_empty());
}
