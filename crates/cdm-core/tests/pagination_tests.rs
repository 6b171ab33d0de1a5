use cdm_core::{LoadStatus, MaterialsPage, ServiceError, SessionError, ToastVariant};
use cdm_test_utils::{listing, materials, pinned, settle, Harness};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[tokio::test]
async fn test_first_page_then_older_page() {
    let h = Harness::builder(listing(25, 25)).build();

    h.session.load().await.unwrap();
    assert_eq!(h.session.materials().len(), 20);
    assert_eq!(h.session.total_count(), 25);
    assert!(!h.session.no_more_images());

    let appended = h.session.load_older().await.unwrap();
    assert_eq!(appended, 5);
    assert!(h.session.no_more_images());

    let requests = h.materials.requests();
    assert_eq!(requests[0].offset, 0);
    assert_eq!(requests[0].size, 20);
    assert_eq!(requests[1].offset, 20);

    let indices: Vec<usize> = h.session.materials().iter().map(|m| m.index).collect();
    assert_eq!(indices, (0..25).collect::<Vec<_>>());

    let toasts = h.notifier.toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].description, "Fetched 5 images.");
}

#[tokio::test]
async fn test_pinned_material_not_counted_in_offset() {
    let mut mats = vec![pinned(100)];
    mats.extend(materials(24));
    let h = Harness::builder(MaterialsPage::new(mats, 25)).build();

    h.session.load().await.unwrap();
    assert!(h.session.materials()[0].deployed);

    h.session.load_older().await.unwrap();
    assert_eq!(h.materials.requests()[1].offset, 19);
}

#[tokio::test]
async fn test_older_page_drops_deployed_latest_duplicate() {
    let mut mats = materials(20);
    mats.push(pinned(100));
    mats.extend(materials(25).into_iter().skip(20));
    let h = Harness::builder(MaterialsPage::new(mats, 26)).build();

    h.session.load().await.unwrap();
    let appended = h.session.load_older().await.unwrap();

    assert_eq!(appended, 5);
    assert!(h.session.materials().iter().all(|m| !m.deployed));
    assert_eq!(h.session.materials().last().map(|m| m.index), Some(24));
}

#[tokio::test]
async fn test_load_older_without_more_images_is_noop() {
    let h = Harness::builder(listing(5, 5)).build();

    h.session.load().await.unwrap();
    assert!(h.session.no_more_images());
    assert_eq!(h.session.load_older().await.unwrap(), 0);
    assert_eq!(h.materials.request_count(), 1);
}

#[tokio::test]
async fn test_load_older_ignored_while_outstanding() {
    let h = Harness::builder(listing(25, 25)).gated_materials().build();
    h.materials.release(1);
    h.session.load().await.unwrap();

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.load_older().await });
    settle(|| h.materials.request_count() == 2).await;
    assert!(h.session.is_loading_more());

    assert_eq!(h.session.load_older().await.unwrap(), 0);
    assert_eq!(h.materials.request_count(), 2);

    h.materials.release(1);
    assert_eq!(pending.await.unwrap().unwrap(), 5);
    assert!(!h.session.is_loading_more());
}

#[tokio::test]
async fn test_older_page_failure_goes_to_error_presenter() {
    let h = Harness::builder(listing(25, 25)).build();
    h.session.load().await.unwrap();

    h.materials
        .fail_next(ServiceError::Transport("connection reset".into()));
    let err = h.session.load_older().await.unwrap_err();

    assert!(!err.is_aborted());
    assert_eq!(h.notifier.errors().len(), 1);
    assert_eq!(h.session.materials().len(), 20);
}

#[tokio::test]
async fn test_first_page_failure_sets_failed_status() {
    let h = Harness::builder(listing(5, 5)).build();
    h.materials
        .fail_next(ServiceError::Transport("connection refused".into()));

    let err = h.session.load().await.unwrap_err();
    assert!(matches!(err, SessionError::Fetch(_)));
    assert!(matches!(h.session.status(), LoadStatus::Failed { .. }));
    assert!(h.notifier.errors().is_empty());

    h.session.refresh().await.unwrap();
    assert_eq!(h.session.status(), LoadStatus::Loaded);
}

#[tokio::test]
async fn test_newer_load_supersedes_outstanding_one() {
    let h = Harness::builder(listing(25, 25)).gated_materials().build();

    let session = h.session.clone();
    let first = tokio::spawn(async move { session.load().await });
    settle(|| h.materials.request_count() == 1).await;

    let session = h.session.clone();
    let second = tokio::spawn(async move { session.set_search(Some("app:2")).await });
    settle(|| h.materials.request_count() == 2).await;
    h.materials.release(1);

    let first = first.await.unwrap();
    assert!(first.unwrap_err().is_aborted());
    second.await.unwrap().unwrap();

    assert_eq!(h.session.search().as_deref(), Some("app:2"));
    assert!(h
        .session
        .materials()
        .iter()
        .all(|m| m.image.contains("app:2")));
    assert_eq!(
        h.navigator.last_query().unwrap().search(),
        Some("app:2")
    );
}

#[tokio::test]
async fn test_unmount_aborts_older_page_silently() {
    let h = Harness::builder(listing(25, 25)).gated_materials().build();
    h.materials.release(1);
    h.session.load().await.unwrap();

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.load_older().await });
    settle(|| h.materials.request_count() == 2).await;
    h.session.unmount();

    assert!(pending.await.unwrap().unwrap_err().is_aborted());
    assert!(h.notifier.errors().is_empty());
    assert!(h.notifier.toasts().is_empty());
}

#[tokio::test]
async fn test_older_page_toast_with_resource_filters() {
    use cdm_material::{AppliedFilter, FilterState};

    let mut mats = materials(22);
    mats[20].filter_state = FilterState::Blocked;
    mats[21].filter_state = FilterState::Blocked;
    let mut page = MaterialsPage::new(mats, 22);
    page.resource_filters = vec![AppliedFilter {
        id: 1,
        name: "no-critical-cves".into(),
        description: None,
    }];
    let h = Harness::builder(page).build();

    h.session.load().await.unwrap();
    h.session.load_older().await.unwrap();

    let toast = h.notifier.toasts().pop().unwrap();
    assert_eq!(toast.variant, ToastVariant::Info);
    assert_eq!(
        toast.description,
        "Fetched 2 images. No new eligible images found."
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_paging_loads_every_material_once(total in 0u64..70) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let h = Harness::builder(listing(total, total as usize)).build();
            h.session.load().await.unwrap();
            while !h.session.no_more_images() {
                h.session.load_older().await.unwrap();
            }

            let ids: Vec<u64> = h.session.materials().iter().map(|m| m.id).collect();
            prop_assert_eq!(ids, (1..=total).collect::<Vec<_>>());
            Ok(())
        })?;
    }
}
