//! Behaviour of the in-memory ledger through the `LedgerStore` contract.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;

use favisend_common::{AppError, LedgerConfig};
use favisend_core::{
    FileChanges, LedgerStore, MemoryLedger, NewComment, NewDownload, NewFile, NewPayment, NewUser,
    verify_password,
};
use favisend_db::entities::PaymentStatus;
use futures::future::join_all;

fn ledger() -> Arc<dyn LedgerStore> {
    Arc::new(MemoryLedger::default())
}

fn named(username: &str) -> NewUser {
    NewUser {
        username: Some(username.to_string()),
        ..NewUser::default()
    }
}

fn upload(title: &str) -> NewFile {
    NewFile {
        title: title.to_string(),
        description: Some("Scanned lecture notes".to_string()),
        file_name: format!("{title}.pdf"),
        file_size: 4096,
        content_type: "application/pdf".to_string(),
        download_url: format!("https://cdn.example/{title}.pdf"),
        tags: vec!["notes".to_string()],
    }
}

fn review(file_id: &str, user_id: &str, rating: i32) -> NewComment {
    NewComment {
        file_id: file_id.to_string(),
        user_id: user_id.to_string(),
        body: "Useful".to_string(),
        rating,
    }
}

fn payout(user_id: &str, amount: i64) -> NewPayment {
    NewPayment {
        user_id: user_id.to_string(),
        amount,
        payment_method: "mobile_money".to_string(),
        transaction_id: None,
        details: None,
        status: None,
    }
}

#[tokio::test]
async fn anonymous_downloads_credit_the_owner() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    for _ in 0..3 {
        let record = store
            .record_download(NewDownload::anonymous(&file.id))
            .await
            .unwrap();
        assert_eq!(record.earnings, 450);
    }

    let file = store.get_file(&file.id).await.unwrap().unwrap();
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(file.downloads, 3);
    assert_eq!(owner.balance, 1350);
}

#[tokio::test]
async fn uncredited_anonymous_downloads_earn_nothing() {
    let config = LedgerConfig {
        credit_anonymous_downloads: false,
        ..LedgerConfig::default()
    };
    let store = MemoryLedger::new(config);
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let anonymous = store
        .record_download(NewDownload::anonymous(&file.id))
        .await
        .unwrap();
    let signed_in = store
        .record_download(NewDownload::by_user(&file.id, &reader.id))
        .await
        .unwrap();

    assert_eq!(anonymous.earnings, 0);
    assert_eq!(signed_in.earnings, 450);
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 450);
    assert_eq!(store.get_file(&file.id).await.unwrap().unwrap().downloads, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_downloads_lose_no_update() {
    const N: usize = 200;

    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("popular"), &owner.id).await.unwrap();

    let tasks = (0..N).map(|_| {
        let store = Arc::clone(&store);
        let file_id = file.id.clone();
        tokio::spawn(async move {
            store
                .record_download(NewDownload::anonymous(file_id))
                .await
                .unwrap();
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let file = store.get_file(&file.id).await.unwrap().unwrap();
    let owner = store.get_user(&owner.id).await.unwrap().unwrap();
    assert_eq!(file.downloads, N as i64);
    assert_eq!(owner.balance, N as i64 * 450);
    assert_eq!(store.list_file_downloads(&file.id).await.unwrap().len(), N);
}

#[tokio::test]
async fn ratings_form_a_running_average() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    store
        .create_comment(review(&file.id, &reader.id, 4))
        .await
        .unwrap();
    let after_one = store.get_file(&file.id).await.unwrap().unwrap();
    assert_eq!(after_one.rating, 4.0);
    assert_eq!(after_one.total_ratings, 1);

    store
        .create_comment(review(&file.id, &reader.id, 2))
        .await
        .unwrap();
    let after_two = store.get_file(&file.id).await.unwrap().unwrap();
    assert_eq!(after_two.rating, 3.0);
    assert_eq!(after_two.total_ratings, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ratings_average_correctly() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let ratings: Vec<i32> = (0..100).map(|i| i % 5 + 1).collect();
    let tasks = ratings.iter().map(|&rating| {
        let store = Arc::clone(&store);
        let comment = review(&file.id, &reader.id, rating);
        tokio::spawn(async move { store.create_comment(comment).await.unwrap() })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let mean = f64::from(ratings.iter().sum::<i32>()) / ratings.len() as f64;
    let file = store.get_file(&file.id).await.unwrap().unwrap();
    assert_eq!(file.total_ratings, 100);
    assert!((file.rating - mean).abs() < 1e-9);
}

#[tokio::test]
async fn comment_rating_out_of_range_is_rejected() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    for rating in [0, 6] {
        let err = store
            .create_comment(review(&file.id, &owner.id, rating))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    let file = store.get_file(&file.id).await.unwrap().unwrap();
    assert_eq!(file.total_ratings, 0);
}

#[tokio::test]
async fn deleting_a_file_removes_its_events() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let download = store
        .record_download(NewDownload::by_user(&file.id, &reader.id))
        .await
        .unwrap();
    let comment = store
        .create_comment(review(&file.id, &reader.id, 5))
        .await
        .unwrap();

    assert!(store.delete_file(&file.id).await.unwrap());
    assert!(!store.delete_file(&file.id).await.unwrap());

    assert!(store.get_file(&file.id).await.unwrap().is_none());
    assert!(store.get_download(&download.id).await.unwrap().is_none());
    assert!(store.get_comment(&comment.id).await.unwrap().is_none());
    assert!(store.list_file_comments(&file.id).await.unwrap().is_empty());
    assert!(
        store
            .list_downloads_made_by(&reader.id)
            .await
            .unwrap()
            .is_empty()
    );

    // Earned money stays earned.
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 450);
}

#[tokio::test]
async fn events_against_missing_rows_are_dangling() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let err = store
        .record_download(NewDownload::anonymous("no-such-file"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DanglingReference(_)));

    let err = store
        .record_download(NewDownload::by_user(&file.id, "no-such-user"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DanglingReference(_)));

    let err = store
        .create_comment(review("no-such-file", &owner.id, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DanglingReference(_)));

    let err = store
        .create_file(upload("orphan"), "no-such-user")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DanglingReference(_)));

    let err = store
        .create_payment(payout("no-such-user", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DanglingReference(_)));

    // Nothing was counted.
    assert_eq!(store.get_file(&file.id).await.unwrap().unwrap().downloads, 0);
}

#[tokio::test]
async fn share_tokens_are_unique() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();

    let mut tokens = HashSet::new();
    for i in 0..10_000 {
        let file = store
            .create_file(upload(&format!("file{i}")), &owner.id)
            .await
            .unwrap();
        assert!(file.share_token.len() >= 10);
        assert!(tokens.insert(file.share_token));
    }
}

#[tokio::test]
async fn file_is_found_by_share_token() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let found = store
        .get_file_by_share_token(&file.share_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, file.id);
    assert!(store.get_file_by_share_token("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn payment_completes_exactly_once() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    store.adjust_user_balance(&owner.id, 10_000).await.unwrap();

    let mut request = payout(&owner.id, 5000);
    request.status = Some(PaymentStatus::Completed);
    let payment = store.create_payment(request).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.completed_at.is_none());

    let completed = store
        .update_payment_status(&payment.id, PaymentStatus::Completed, Some("tx-1".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(completed.transaction_id.as_deref(), Some("tx-1"));
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 5000);

    let again = store
        .update_payment_status(&payment.id, PaymentStatus::Completed, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.completed_at, completed.completed_at);
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 5000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_completions_debit_once() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let payment = store.create_payment(payout(&owner.id, 700)).await.unwrap();

    let tasks = (0..16).map(|_| {
        let store = Arc::clone(&store);
        let id = payment.id.clone();
        tokio::spawn(async move {
            store
                .update_payment_status(&id, PaymentStatus::Completed, None)
                .await
                .unwrap()
        })
    });
    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap().status, PaymentStatus::Completed);
    }

    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, -700);
}

#[tokio::test]
async fn terminal_payments_reject_other_transitions() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();

    let failed = store.create_payment(payout(&owner.id, 100)).await.unwrap();
    store
        .update_payment_status(&failed.id, PaymentStatus::Failed, None)
        .await
        .unwrap();
    let err = store
        .update_payment_status(&failed.id, PaymentStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    let completed = store.create_payment(payout(&owner.id, 100)).await.unwrap();
    store
        .update_payment_status(&completed.id, PaymentStatus::Completed, None)
        .await
        .unwrap();
    let err = store
        .update_payment_status(&completed.id, PaymentStatus::Pending, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    // Only the completed payment moved money.
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, -100);
    assert!(
        store
            .update_payment_status("missing", PaymentStatus::Completed, None)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn pending_update_only_records_transaction_id() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let payment = store.create_payment(payout(&owner.id, 100)).await.unwrap();

    let updated = store
        .update_payment_status(&payment.id, PaymentStatus::Pending, Some("tx-9".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PaymentStatus::Pending);
    assert_eq!(updated.transaction_id.as_deref(), Some("tx-9"));
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 0);
}

#[tokio::test]
async fn invalid_payment_amount_is_rejected() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();

    let err = store.create_payment(payout(&owner.id, 0)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.list_user_payments(&owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn user_identities_are_unique() {
    let store = ledger();
    store
        .create_user(NewUser {
            external_id: Some("uid-1".to_string()),
            email: Some("a@example.com".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();

    let err = store
        .create_user(NewUser {
            external_id: Some("uid-1".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateKey(_)));

    let err = store
        .create_user(NewUser {
            email: Some("a@example.com".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateKey(_)));

    let err = store.create_user(NewUser::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let found = store.get_user_by_external_id("uid-1").await.unwrap().unwrap();
    assert_eq!(found.balance, 0);
}

#[tokio::test]
async fn local_password_is_hashed() {
    let store = ledger();
    let user = store
        .create_user(NewUser {
            username: Some("carol".to_string()),
            password: Some("hunter2hunter2".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();

    let hash = user.password_hash.unwrap();
    assert_ne!(hash, "hunter2hunter2");
    assert!(verify_password("hunter2hunter2", &hash).unwrap());

    let found = store.get_user_by_username("carol").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
}

#[tokio::test]
async fn users_are_found_by_email() {
    let store = ledger();
    let user = store
        .create_user(NewUser {
            email: Some("dana@example.com".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();

    let found = store
        .get_user_by_email("dana@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, user.id);
    assert!(store.get_user_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn oversize_input_is_a_validation_error() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();

    let mut long_url = upload("notes");
    long_url.download_url = format!("https://cdn.example/{}", "a".repeat(2000));
    let err = store.create_file(long_url, &owner.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");

    let mut long_type = upload("notes");
    long_type.content_type = "x".repeat(200);
    let err = store.create_file(long_type, &owner.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");

    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();
    let mut download = NewDownload::anonymous(&file.id);
    download.ip_address = Some("1".repeat(100));
    let err = store.record_download(download).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    assert_eq!(store.get_file(&file.id).await.unwrap().unwrap().downloads, 0);

    let payment = store.create_payment(payout(&owner.id, 100)).await.unwrap();
    let err = store
        .update_payment_status(&payment.id, PaymentStatus::Completed, Some("t".repeat(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    let unchanged = store.get_payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Pending);
    assert_eq!(store.get_user(&owner.id).await.unwrap().unwrap().balance, 0);
}

#[tokio::test]
async fn share_tokens_fit_the_column() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new(LedgerConfig {
        share_token_length: 80,
        ..LedgerConfig::default()
    }));
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();
    assert_eq!(file.share_token.len(), 64);
}

#[tokio::test]
async fn listings_are_ordered_and_limited() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();

    let mut files = Vec::new();
    for i in 0..12 {
        files.push(
            store
                .create_file(upload(&format!("f{i}")), &owner.id)
                .await
                .unwrap(),
        );
    }

    for _ in 0..3 {
        store
            .record_download(NewDownload::anonymous(&files[4].id))
            .await
            .unwrap();
    }
    store
        .record_download(NewDownload::anonymous(&files[7].id))
        .await
        .unwrap();
    store
        .create_comment(review(&files[2].id, &reader.id, 5))
        .await
        .unwrap();
    store
        .create_comment(review(&files[9].id, &reader.id, 3))
        .await
        .unwrap();

    let popular = store.list_popular_files(Some(3)).await.unwrap();
    assert_eq!(popular.len(), 3);
    assert_eq!(popular[0].id, files[4].id);
    assert_eq!(popular[1].id, files[7].id);
    // Zero-download ties fall back to the newest ID.
    assert_eq!(popular[2].id, files[11].id);

    let recent = store.list_recent_files(None).await.unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0].id, files[11].id);

    let top = store.list_top_rated_files(Some(2)).await.unwrap();
    assert_eq!(top[0].id, files[2].id);
    assert_eq!(top[1].id, files[9].id);

    let owned = store.list_files_by_owner(&owner.id).await.unwrap();
    assert_eq!(owned.len(), 12);
    assert_eq!(owned[0].id, files[11].id);
}

#[tokio::test]
async fn download_listings_split_earnings_from_activity() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let reader = store.create_user(named("reader")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();

    let first = store
        .record_download(NewDownload::by_user(&file.id, &reader.id))
        .await
        .unwrap();
    let second = store
        .record_download(NewDownload::anonymous(&file.id))
        .await
        .unwrap();

    let earned = store.list_user_downloads(&owner.id).await.unwrap();
    assert_eq!(earned.len(), 2);
    assert_eq!(earned[0].id, second.id);
    assert_eq!(earned[1].id, first.id);

    let made = store.list_downloads_made_by(&reader.id).await.unwrap();
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].id, first.id);

    assert!(store.list_user_downloads(&reader.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_file_merges_metadata_only() {
    let store = ledger();
    let owner = store.create_user(named("owner")).await.unwrap();
    let file = store.create_file(upload("notes"), &owner.id).await.unwrap();
    store
        .record_download(NewDownload::anonymous(&file.id))
        .await
        .unwrap();

    let updated = store
        .update_file(
            &file.id,
            FileChanges {
                title: Some("Revised notes".to_string()),
                tags: Some(vec!["notes".to_string(), "2024".to_string()]),
                ..FileChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.title, "Revised notes");
    assert_eq!(updated.tag_list(), vec!["notes", "2024"]);
    assert_eq!(updated.file_name, file.file_name);
    assert_eq!(updated.share_token, file.share_token);
    assert_eq!(updated.downloads, 1);
    assert!(updated.updated_at >= file.updated_at);

    let cleared = store
        .update_file(
            &file.id,
            FileChanges {
                description: Some(None),
                ..FileChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(cleared.description.is_none());
    assert_eq!(cleared.title, "Revised notes");

    assert!(
        store
            .update_file("missing", FileChanges::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn adjust_balance_of_missing_user_is_none() {
    let store = ledger();
    assert!(store.adjust_user_balance("ghost", 10).await.unwrap().is_none());

    let user = store.create_user(named("owner")).await.unwrap();
    let adjusted = store
        .adjust_user_balance(&user.id, -250)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(adjusted.balance, -250);
}
