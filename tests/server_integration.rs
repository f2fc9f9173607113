use articlecraft::config::Config;
use articlecraft::corpus::CorpusEntry;
use articlecraft::embedding::VectorizerKind;
use articlecraft::server::{IpcClient, IpcMessage, QueryServer};
use articlecraft::service::ArticleServices;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

#[tokio::test]
async fn test_query_server_roundtrip() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let mut config = Config::default();
    config.storage.artifacts_dir = root.join("models");
    config.storage.database_file = root.join("articles.sqlite");
    config.generation.reference_dir = root.join("vector_db");
    config.generation.vectorizer = VectorizerKind::Tfidf;

    let services = Arc::new(ArticleServices::new(config));
    services
        .build_index(vec![
            CorpusEntry::new("0", "A", "Cats are lovely pets.", "cats are lovely pets"),
            CorpusEntry::new("1", "B", "Dogs are loyal pets.", "dogs are loyal pets"),
            CorpusEntry::new("2", "C", "Stock markets fell.", "stock markets fell"),
        ])
        .unwrap();

    let socket_path = root.join("articlecraft.sock");
    let server = QueryServer::new(services, socket_path.clone(), 4);
    let handle = tokio::spawn(server.run_until(std::future::pending::<()>()));

    // Wait for the socket to appear
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let client = IpcClient::new(socket_path.clone());

    let response = client
        .send(&IpcMessage::Similar {
            title: "A".to_string(),
            top_k: Some(1),
        })
        .await
        .unwrap();
    assert!(response.success);
    let data = response.data.unwrap();
    assert_eq!(data[0]["title"], "B");

    let missing = client
        .send(&IpcMessage::Similar {
            title: "Z".to_string(),
            top_k: None,
        })
        .await
        .unwrap();
    assert!(!missing.success);
    assert_eq!(missing.kind.as_deref(), Some("not_found"));

    let generate = client
        .send(&IpcMessage::Generate {
            title: "New".to_string(),
            num_similar: None,
        })
        .await
        .unwrap();
    assert_eq!(generate.kind.as_deref(), Some("generation_unavailable"));

    let status = client.send(&IpcMessage::Status).await.unwrap();
    assert_eq!(status.data.unwrap()["articles"], 3);

    let stop = client.send(&IpcMessage::Stop).await.unwrap();
    assert!(stop.success);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!socket_path.exists());
}
