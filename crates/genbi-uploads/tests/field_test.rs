mod helpers;

use genbi_core::models::{OriginKind, UploadableFile};
use genbi_core::UploadError;
use genbi_uploads::{FieldConfig, FieldStatus, UploadForm, UploadMode};
use helpers::{pdf, png, staging_id, until, Call, CountingPreviews, MockStaging};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn form(staging: &Arc<MockStaging>, previews: &Arc<CountingPreviews>) -> UploadForm {
    UploadForm::new(staging.clone(), previews.clone())
}

#[tokio::test]
async fn test_deferred_select_previews_locally_without_network() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    field.select(png("logo.png")).await.unwrap();

    let value = field.first().unwrap();
    assert_eq!(value.origin_kind(), OriginKind::LocalPending);
    assert!(value.url.starts_with("blob:"));
    assert_eq!(field.status(), FieldStatus::LocalPreview);
    assert!(form.tracker().is_tracked(&value.url));
    assert!(staging.calls().is_empty());
}

#[tokio::test]
async fn test_replacing_local_file_releases_previous_preview_once() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    field.select(png("a.png")).await.unwrap();
    let first = field.first().unwrap().url;
    field.select(png("b.png")).await.unwrap();
    let second = field.first().unwrap().url;

    assert_eq!(previews.revocations(&first), 1);
    assert_eq!(previews.revocations(&second), 0);
    assert_eq!(form.tracker().len(), 1);

    form.unmount();
    assert_eq!(previews.revocations(&first), 1);
    assert_eq!(previews.revocations(&second), 1);
    assert_eq!(previews.live_count(), 0);
}

#[tokio::test]
async fn test_oversized_file_is_rejected_before_upload() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(
            FieldConfig::new("coverImage", "Gambar sampul", UploadMode::StagedPreview)
                .max_size_bytes(2),
        )
        .unwrap();

    let err = field.select(png("cover.png")).await.unwrap_err();

    assert!(matches!(err, UploadError::Validation(_)));
    assert_eq!(field.error().as_deref(), Some("Ukuran file maksimal 2 byte"));
    assert_eq!(field.status(), FieldStatus::Error);
    assert!(field.value().is_empty());
    assert!(staging.calls().is_empty());
}

#[tokio::test]
async fn test_unaccepted_type_keeps_previous_value() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred).accept("image/*"))
        .unwrap();

    field.select(png("logo.png")).await.unwrap();
    let before = field.value();

    let err = field.select(pdf("logo.pdf")).await.unwrap_err();

    assert!(matches!(err, UploadError::Validation(_)));
    assert_eq!(field.value(), before);
    assert_eq!(form.tracker().len(), 1);
}

#[tokio::test]
async fn test_staged_preview_select_stages_file() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    field.select(png("cover.png")).await.unwrap();

    let value = field.first().unwrap();
    assert_eq!(value.staging_id(), Some(staging_id("cover.png").as_str()));
    assert_eq!(field.status(), FieldStatus::Staged);
    assert!(!field.is_uploading());
    assert_eq!(staging.calls(), vec![Call::Stage("cover.png".to_string())]);
    assert!(form.tracker().is_empty());
}

#[tokio::test]
async fn test_direct_select_stores_file_permanently() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(
            FieldConfig::new("document", "Dokumen", UploadMode::Direct).folder("documents"),
        )
        .unwrap();

    field.select(pdf("sk.pdf")).await.unwrap();

    let value = field.first().unwrap();
    assert_eq!(value.origin_kind(), OriginKind::Finalized);
    assert_eq!(value.url, "https://cdn.genbi.test/documents/sk.pdf");
    assert_eq!(value.mime_type, "application/pdf");
    assert_eq!(field.status(), FieldStatus::Stored);
}

#[tokio::test]
async fn test_staging_failure_sets_error_and_keeps_value() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    field.select(png("first.png")).await.unwrap();
    staging.fail_staging("second.png");

    let err = field.select(png("second.png")).await.unwrap_err();

    assert!(matches!(err, UploadError::StagingUpload(_)));
    assert_eq!(field.status(), FieldStatus::Error);
    assert_eq!(
        field.error().as_deref(),
        Some("Gagal mengupload file: File terlalu besar")
    );
    assert_eq!(field.first().unwrap().name, "first.png");
    assert!(staging.deleted().is_empty());
}

#[tokio::test]
async fn test_late_completion_of_superseded_selection_is_discarded() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    let gate = staging.hold_staging("a.png");
    let slow = tokio::spawn({
        let field = field.clone();
        async move { field.select(png("a.png")).await }
    });
    until(|| field.is_uploading()).await;
    assert_eq!(field.status(), FieldStatus::Uploading);

    field.select(png("b.png")).await.unwrap();
    assert_eq!(field.first().unwrap().name, "b.png");

    gate.notify_one();
    slow.await.unwrap().unwrap();

    let value = field.value();
    assert_eq!(value.len(), 1);
    assert_eq!(value[0].staging_id(), Some(staging_id("b.png").as_str()));
    assert_eq!(staging.deleted(), vec![staging_id("a.png")]);
    assert!(!field.is_uploading());
}

#[tokio::test]
async fn test_completion_after_unmount_is_dropped() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    let gate = staging.hold_staging("a.png");
    let pending = tokio::spawn({
        let field = field.clone();
        async move { field.select(png("a.png")).await }
    });
    until(|| field.is_uploading()).await;

    drop(form);
    gate.notify_one();
    pending.await.unwrap().unwrap();

    assert!(field.value().is_empty());
    assert!(!field.is_uploading());
    assert_eq!(field.status(), FieldStatus::Idle);
    assert_eq!(staging.deleted(), vec![staging_id("a.png")]);
}

#[tokio::test]
async fn test_preview_shared_between_fields_survives_removal_from_one() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let logo = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();
    let favicon = form
        .add_field(FieldConfig::new("favicon", "Favicon", UploadMode::Deferred))
        .unwrap();

    logo.select(png("logo.png")).await.unwrap();
    let shared = logo.first().unwrap();
    favicon.set_value(vec![shared.clone()]);

    logo.remove(0);
    assert_eq!(previews.revocations(&shared.url), 0);
    assert!(form.tracker().is_tracked(&shared.url));
    assert_eq!(favicon.status(), FieldStatus::LocalPreview);

    favicon.remove(0);
    assert_eq!(previews.revocations(&shared.url), 1);
    assert!(form.tracker().is_empty());

    form.unmount();
    assert_eq!(previews.revocations(&shared.url), 1);
}

#[tokio::test]
async fn test_removing_staged_file_deletes_artifact() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    field.select(png("cover.png")).await.unwrap();
    let cleanup = field.remove(0);
    assert_eq!(cleanup.len(), 1);
    cleanup.finished().await;

    assert!(field.value().is_empty());
    assert_eq!(field.status(), FieldStatus::Idle);
    assert_eq!(staging.deleted(), vec![staging_id("cover.png")]);
}

#[tokio::test]
async fn test_replacing_staged_file_deletes_previous_artifact() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new(
            "coverImage",
            "Gambar sampul",
            UploadMode::StagedPreview,
        ))
        .unwrap();

    field.select(png("a.png")).await.unwrap();
    field.select(png("b.png")).await.unwrap();
    until(|| !staging.deleted().is_empty()).await;

    assert_eq!(staging.deleted(), vec![staging_id("a.png")]);
}

#[tokio::test]
async fn test_multiple_field_appends_and_removes_by_index() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("gallery", "Galeri", UploadMode::Deferred).multiple(true))
        .unwrap();

    let results = field
        .select_many(vec![png("1.png"), png("2.png"), png("3.png")])
        .await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(field.value().len(), 3);

    let removed = field.value()[1].url.clone();
    field.remove(1);

    let names: Vec<String> = field.value().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["1.png", "3.png"]);
    assert_eq!(previews.revocations(&removed), 1);
    assert_eq!(form.tracker().len(), 2);
}

#[tokio::test]
async fn test_single_field_takes_first_of_many() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    let results = field.select_many(vec![png("1.png"), png("2.png")]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(field.first().unwrap().name, "1.png");
    assert_eq!(form.tracker().len(), 1);
}

#[tokio::test]
async fn test_set_value_and_clear() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    field.select(png("draft.png")).await.unwrap();
    let local = field.first().unwrap().url;

    field.set_value(vec![UploadableFile::remote("https://cdn.genbi.test/logo.png")]);
    assert_eq!(field.status(), FieldStatus::Stored);
    assert_eq!(previews.revocations(&local), 1);

    field.clear();
    assert_eq!(field.status(), FieldStatus::Idle);
    assert!(staging.deleted().is_empty());
}

#[tokio::test]
async fn test_change_listener_sees_new_value() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    let field = form
        .add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    field.on_change({
        let seen = seen.clone();
        move |files| seen.store(files.len() + 10, Ordering::SeqCst)
    });

    field.select(png("logo.png")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 11);

    field.clear();
    assert_eq!(seen.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_duplicate_field_key_is_rejected() {
    let staging = MockStaging::new();
    let previews = CountingPreviews::new();
    let form = form(&staging, &previews);
    form.add_field(FieldConfig::new("logo", "Logo", UploadMode::Deferred))
        .unwrap();

    assert!(form
        .add_field(FieldConfig::new("logo", "Logo lain", UploadMode::Direct))
        .is_err());
}
