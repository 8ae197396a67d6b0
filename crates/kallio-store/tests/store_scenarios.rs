//! End-to-end behaviour of the three stores sharing one data directory.

use kallio_store::{
    AttachmentKind, AttachmentStore, BytesSource, ChatEntry, Database, ErrorKind, MessageStore,
    NewEntry, ProfileStore, StoreConfig,
};

struct Stores {
    _dir: tempfile::TempDir,
    config: StoreConfig,
    messages: MessageStore,
    profile: ProfileStore,
    attachments: AttachmentStore,
}

fn open_stores() -> Stores {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at(dir.path());
    Stores {
        messages: MessageStore::open(&config).unwrap(),
        profile: ProfileStore::open(&config).unwrap(),
        attachments: AttachmentStore::open(&config).unwrap(),
        config,
        _dir: dir,
    }
}

fn shape(entries: &[ChatEntry]) -> Vec<(i64, &str, Option<&str>)> {
    entries
        .iter()
        .map(|e| (e.id, e.text.as_str(), e.image_path.as_deref()))
        .collect()
}

#[tokio::test]
async fn append_scenario() {
    let stores = open_stores();
    let mut sub = stores.messages.subscribe().await.unwrap();
    assert!(sub.recv().await.unwrap().is_empty());

    stores.messages.append(NewEntry::text("hello")).await.unwrap();
    let after_first = sub.recv().await.unwrap();
    assert_eq!(shape(&after_first), vec![(1, "hello", None)]);

    stores
        .messages
        .append(NewEntry {
            text: Some(String::new()),
            image_path: Some("/img/a.jpg".into()),
        })
        .await
        .unwrap();
    let after_second = sub.recv().await.unwrap();
    assert_eq!(
        shape(&after_second),
        vec![(1, "hello", None), (2, "", Some("/img/a.jpg"))]
    );

    let err = stores
        .messages
        .append(NewEntry {
            text: None,
            image_path: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEntry);
    assert!(sub.try_recv().is_none());
    assert_eq!(stores.messages.snapshot().await.unwrap(), after_second);
}

#[tokio::test]
async fn every_emission_is_sorted_prefix_of_history() {
    let stores = open_stores();
    let mut sub = stores.messages.subscribe().await.unwrap();
    sub.recv().await.unwrap();

    let mut appended = Vec::new();
    for i in 0..10 {
        appended.push(
            stores
                .messages
                .append(NewEntry::text(format!("entry {i}")))
                .await
                .unwrap(),
        );

        let mut expected = appended.clone();
        expected.sort_by_key(ChatEntry::order_key);
        assert_eq!(*sub.recv().await.unwrap(), expected);
    }
}

#[tokio::test]
async fn profile_image_scenario() {
    let stores = open_stores();

    let p1 = stores
        .attachments
        .persist(BytesSource(b"first".to_vec()), AttachmentKind::ProfilePicture)
        .await
        .unwrap();
    let p2 = stores
        .attachments
        .persist(BytesSource(b"second".to_vec()), AttachmentKind::ProfilePicture)
        .await
        .unwrap();

    stores.profile.set_profile_image(&p1.to_path_string()).unwrap();
    stores.profile.set_profile_image(&p2.to_path_string()).unwrap();

    let profile = stores.profile.get_profile();
    assert_eq!(profile.image_path, Some(p2.to_path_string()));
    assert!(!p1.path.exists());
    assert!(p2.path.exists());
}

#[tokio::test]
async fn profile_survives_reopen() {
    let stores = open_stores();
    stores.profile.set_display_name("Alice").unwrap();
    assert_eq!(stores.profile.get_profile(), stores.profile.get_profile());

    let reopened = ProfileStore::open(&stores.config).unwrap();
    assert_eq!(reopened.get_profile().display_name, "Alice");
}

#[tokio::test]
async fn photo_entry_and_orphan_pruning() {
    let stores = open_stores();

    let photo = stores
        .attachments
        .persist(BytesSource(vec![0xFF, 0xD8, 0xFF]), AttachmentKind::MessagePhoto)
        .await
        .unwrap();
    let entry = stores
        .messages
        .append(NewEntry::image(photo.to_path_string()))
        .await
        .unwrap();
    assert_eq!(entry.image_path, Some(photo.to_path_string()));

    let stray = stores
        .attachments
        .persist(BytesSource(vec![1]), AttachmentKind::MessagePhoto)
        .await
        .unwrap();

    let mut referenced = Database::open(&stores.config)
        .unwrap()
        .message_image_paths()
        .unwrap();
    referenced.extend(stores.profile.get_profile().image_path);

    let removed = stores.attachments.prune_orphans(referenced).unwrap();
    assert_eq!(removed, vec![stray.path]);
    assert!(photo.path.exists());
}
