/// Transaction tests
///
/// Atomicity, first-write-wins logging and misuse detection for actions
/// Run with: cargo test --test transaction_tests

use proptest::prelude::*;
use rustvault::{
    ActionResult, FnTransformer, Guard, LengthValidator, RangeValidator, TransactionStatus, Vault,
    VaultError,
};
use std::sync::{Arc, Mutex};

#[test]
fn test_action_commits_all_writes() {
    let vault = Vault::new();
    let first = vault.register_property("first", || "Ada".to_string(), Guard::none()).unwrap();
    let last = vault.register_property("last", || "Lovelace".to_string(), Guard::none()).unwrap();

    let result = vault
        .action(|tx| {
            tx.mutate(&first, "Grace".to_string())?;
            tx.mutate(&last, "Hopper".to_string())?;
            Ok(format!("{} {}", tx.read(&first), tx.read(&last)))
        })
        .unwrap();

    assert_eq!(result.value().map(String::as_str), Some("Grace Hopper"));
    let info = result.transaction();
    assert_eq!(info.status, TransactionStatus::Committed);
    assert_eq!(info.modified, vec!["first".to_string(), "last".to_string()]);
    assert_eq!(first.read(), "Grace");
    assert_eq!(last.read(), "Hopper");
}

#[test]
fn test_abort_restores_every_touched_property() {
    let vault = Vault::new();
    let balance = vault.register_property("balance", || 100i64, Guard::none()).unwrap();
    let history = vault.register_property("history", Vec::<i64>::new, Guard::none()).unwrap();

    let result = vault
        .action(|tx| {
            tx.update(&balance, |b| b - 40)?;
            tx.update(&history, |h| {
                let mut h = h.clone();
                h.push(-40);
                h
            })?;
            tx.update(&balance, |b| b - 40)?;
            tx.abort::<()>("insufficient approval")
        })
        .unwrap();

    match result {
        ActionResult::Error { cause, transaction } => {
            assert!(matches!(cause, VaultError::Aborted(ref reason) if reason == "insufficient approval"));
            assert_eq!(transaction.status, TransactionStatus::RolledBack);
            assert_eq!(transaction.modified.len(), 2);
        }
        ActionResult::Success { .. } => panic!("aborted action reported success"),
    }

    assert_eq!(balance.read(), 100);
    assert!(history.read().is_empty());
}

#[test]
fn test_rejected_write_rolls_back_earlier_writes() {
    let vault = Vault::new();
    let username = vault
        .register_property(
            "username",
            || "guest".to_string(),
            Guard::validator(LengthValidator::new(3, 50)),
        )
        .unwrap();
    let age = vault
        .register_property("age", || 30u32, Guard::validator(RangeValidator::new(0, 150)))
        .unwrap();

    let result = vault
        .action(|tx| {
            tx.mutate(&username, "alice".to_string())?;
            tx.mutate(&age, 200)
        })
        .unwrap();

    match result.cause() {
        Some(VaultError::Validation { property, .. }) => assert_eq!(property, "age"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(username.read(), "guest");
    assert_eq!(age.read(), 30);
}

#[test]
fn test_foreign_errors_are_recoverable() {
    let vault = Vault::new();
    let count = vault.register_property("count", || 1u8, Guard::none()).unwrap();

    let result = vault
        .action(|tx| {
            tx.mutate(&count, 2)?;
            let parsed: u8 = "not a number".parse().map_err(anyhow::Error::from)?;
            Ok(parsed)
        })
        .unwrap();

    assert!(matches!(result.cause(), Some(VaultError::Other(_))));
    assert_eq!(count.read(), 1);
}

#[test]
fn test_rollback_restores_raw_value_under_transformer() {
    let vault = Vault::new();
    let email = vault
        .register_property(
            "email",
            || "ops@example.com".to_string(),
            Guard::transformer(FnTransformer::new(
                |v: String| v.trim().to_lowercase(),
                |v: &String| v.clone(),
            )),
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _effect = vault.effect(&email, move |v| sink.lock().unwrap().push(v.clone()));

    let _ = vault
        .action(|tx| {
            tx.mutate(&email, "  Admin@Example.COM ".to_string())?;
            assert_eq!(tx.read(&email), "admin@example.com");
            tx.abort::<()>("undo")
        })
        .unwrap();

    assert_eq!(email.read(), "ops@example.com");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "ops@example.com".to_string(),
            "admin@example.com".to_string(),
            "ops@example.com".to_string(),
        ]
    );
}

#[test]
fn test_mutate_outside_action_is_rejected() {
    let vault = Vault::new();
    let count = vault.register_property("count", || 0i32, Guard::none()).unwrap();

    let err = vault.mutate(&count, 10).unwrap_err();
    assert!(matches!(err, VaultError::IllegalUse(_)));
    assert_eq!(count.read(), 0);
}

#[test]
fn test_mutate_from_foreign_thread_is_rejected() {
    let vault = Arc::new(Vault::new());
    let count = vault.register_property("count", || 0i32, Guard::none()).unwrap();

    let result = vault
        .action(|tx| {
            let vault = Arc::clone(&vault);
            let thread_count = Arc::clone(&count);
            let outcome = std::thread::spawn(move || vault.mutate(&thread_count, 99))
                .join()
                .unwrap();
            assert!(matches!(outcome, Err(VaultError::IllegalUse(_))));
            tx.mutate(&count, 1)
        })
        .unwrap();

    assert!(result.is_success());
    assert_eq!(count.read(), 1);
}

#[test]
fn test_registration_type_mismatch() {
    let vault = Vault::new();
    vault.register_property("count", || 0i32, Guard::none()).unwrap();

    let err = vault
        .register_property("count", String::new, Guard::none())
        .unwrap_err();
    assert!(matches!(err, VaultError::TypeMismatch { .. }));

    let again = vault.property::<i32>("count").unwrap();
    assert_eq!(again.read(), 0);
    assert_eq!(vault.property_names(), vec!["count".to_string()]);
}

#[test]
fn test_transaction_ids_are_unique() {
    let vault = Vault::new();
    let count = vault.register_property("count", || 0i32, Guard::none()).unwrap();

    let first = vault.action(|tx| tx.mutate(&count, 1)).unwrap();
    let second = vault.action(|tx| tx.mutate(&count, 2)).unwrap();

    assert_ne!(first.transaction().id, second.transaction().id);
}

#[test]
fn test_transaction_info_serializes() {
    let vault = Vault::new();
    let count = vault.register_property("count", || 0i32, Guard::none()).unwrap();

    let result = vault.action(|tx| tx.mutate(&count, 1)).unwrap();
    let json = serde_json::to_value(result.transaction()).unwrap();

    assert_eq!(json["status"], "committed");
    assert_eq!(json["modified"][0], "count");
}

proptest! {
    #[test]
    fn prop_failed_action_leaves_state_untouched(
        initial in prop::collection::vec(any::<i32>(), 1..6),
        writes in prop::collection::vec((0usize..6, any::<i32>()), 0..24),
    ) {
        let vault = Vault::new();
        let cells: Vec<_> = initial
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let v = *v;
                vault.register_property(&format!("p{i}"), move || v, Guard::none()).unwrap()
            })
            .collect();

        let result = vault
            .action(|tx| {
                for (index, value) in &writes {
                    tx.mutate(&cells[index % cells.len()], *value)?;
                }
                tx.abort::<()>("property test")
            })
            .unwrap();

        prop_assert!(result.is_error());
        for (cell, expected) in cells.iter().zip(&initial) {
            prop_assert_eq!(cell.read(), *expected);
        }
    }

    #[test]
    fn prop_successful_action_keeps_last_write(
        writes in prop::collection::vec(any::<i64>(), 1..16),
    ) {
        let vault = Vault::new();
        let cell = vault.register_property("value", || 0i64, Guard::none()).unwrap();

        let result = vault
            .action(|tx| {
                for value in &writes {
                    tx.mutate(&cell, *value)?;
                }
                Ok(())
            })
            .unwrap();

        prop_assert!(result.is_success());
        prop_assert_eq!(result.transaction().modified.len(), 1);
        prop_assert_eq!(cell.read(), *writes.last().unwrap());
    }
}
