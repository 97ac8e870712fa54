use tubenote::download::{AudioAcquisition, AudioSource};
use tubenote::store::{SessionStatus, SessionStore, SessionUpdate, Stage};

const URL: &str = "https://example.com/watch?v=abc123";

/// Point tool resolution at a path that cannot exist so a fresh download
/// fails fast and deterministically.
fn disable_download_tool() {
    std::env::set_var("YTDLP_LOCATION", "/nonexistent/yt-dlp");
}

async fn completed_download_session(store: &SessionStore, url: &str, title: &str) -> u64 {
    let id = store.create(url, None, None, false).await.unwrap();
    store
        .update(
            id,
            SessionUpdate {
                title: Some(title.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .update_step(id, Stage::Download, SessionStatus::Completed, None)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_cache_reuse_copies_artifact_and_title() {
    disable_download_tool();
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).await.unwrap();

    let owner = completed_download_session(&store, URL, "Cached Title").await;
    let owner_audio = store.audio_dir().join(format!("{owner}.mp3"));
    tokio::fs::write(&owner_audio, b"cached audio bytes").await.unwrap();

    let id = store.create(URL, None, None, false).await.unwrap();
    let acquisition = AudioAcquisition::new(store.audio_dir().to_path_buf());

    let path = acquisition.acquire(&store, id, URL).await.unwrap();
    assert_eq!(path, store.audio_dir().join(format!("{id}.mp3")));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"cached audio bytes");

    let session = store.get(id).await.unwrap();
    assert_eq!(session.title.as_deref(), Some("Cached Title"));
}

#[tokio::test]
async fn test_cache_match_is_case_sensitive() {
    disable_download_tool();
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).await.unwrap();

    let owner = completed_download_session(&store, URL, "Cached Title").await;
    tokio::fs::write(store.audio_dir().join(format!("{owner}.mp3")), b"cached")
        .await
        .unwrap();

    let shouted = "https://EXAMPLE.com/watch?v=abc123";
    let id = store.create(shouted, None, None, false).await.unwrap();
    let acquisition = AudioAcquisition::new(store.audio_dir().to_path_buf());

    // no exact-URL owner, so the fresh download path runs and fails
    let result = acquisition.acquire(&store, id, shouted).await;
    assert!(result.is_err());
    assert!(store.get(id).await.unwrap().title.is_none());
}

#[tokio::test]
async fn test_missing_cached_file_falls_through_to_download() {
    disable_download_tool();
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).await.unwrap();

    // owner session completed its download but the artifact is gone
    completed_download_session(&store, URL, "Cached Title").await;

    let id = store.create(URL, None, None, false).await.unwrap();
    let acquisition = AudioAcquisition::new(store.audio_dir().to_path_buf());

    let result = acquisition.acquire(&store, id, URL).await;
    assert!(result.is_err());
    assert!(!store.audio_dir().join(format!("{id}.mp3")).exists());
}
