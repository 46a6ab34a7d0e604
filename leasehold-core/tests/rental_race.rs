mod support;

use std::sync::Arc;

use leasehold_core::{Error, PropertyStatus};
use sqlx::Row;
use support::{draft, landlord, open, tenant};
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_tenants_racing_for_one_unit_yield_one_winner() {
    let catalog = open().await;
    let owner = landlord(&catalog).await;
    let ann = tenant(&catalog, "Ann").await;
    let bob = tenant(&catalog, "Bob").await;
    let property = catalog
        .properties()
        .create(&owner.id, draft("Last Unit", "Downtown", 2100.0, 2, 1.0))
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let contenders = [ann.id.clone(), bob.id.clone()].map(|tenant_id| {
        let (catalog, barrier, property_id) =
            (catalog.handle(), Arc::clone(&barrier), property.id.clone());
        tokio::spawn(async move {
            barrier.wait().await;
            catalog.rentals().rent(&property_id, &tenant_id).await
        })
    });

    let mut won = Vec::new();
    let mut lost = Vec::new();
    for handle in contenders {
        match handle.await.unwrap() {
            Ok(receipt) => won.push(receipt),
            Err(err) => lost.push(err),
        }
    }

    assert_eq!(won.len(), 1, "exactly one tenant must win");
    assert_eq!(lost.len(), 1);
    assert!(
        matches!(&lost[0], Error::NotAvailable { status: PropertyStatus::Rented, .. }),
        "{:?}",
        lost[0]
    );

    let stored = catalog.properties().get(&property.id).await.unwrap();
    assert_eq!(stored.status, PropertyStatus::Rented);
    assert_eq!(won[0].rent_amount, 2100.0);
    assert_eq!(won[0].property_title, "Last Unit");

    let ledger = catalog
        .executor()
        .fetch_all(
            &leasehold_core::db::Statement::new("SELECT tenant_id FROM rentals WHERE property_id = ?")
                .bind(&property.id),
        )
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    let winner: String = ledger[0].get("tenant_id");
    assert_eq!(winner, won[0].tenant_id);
    assert_eq!(catalog.pool_state().active, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_contenders_still_yield_one_winner() {
    let catalog = open().await;
    let owner = landlord(&catalog).await;
    let property = catalog
        .properties()
        .create(&owner.id, draft("Penthouse", "Downtown", 5000.0, 3, 2.0))
        .await
        .unwrap();

    let mut tenants = Vec::new();
    for name in ["T0", "T1", "T2", "T3", "T4", "T5"] {
        tenants.push(tenant(&catalog, name).await.id);
    }

    let barrier = Arc::new(Barrier::new(tenants.len()));
    let handles: Vec<_> = tenants
        .into_iter()
        .map(|tenant_id| {
            let (catalog, barrier, property_id) =
                (catalog.handle(), Arc::clone(&barrier), property.id.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                catalog.rentals().rent(&property_id, &tenant_id).await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, Error::NotAvailable { .. }), "{err:?}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn renting_twice_reports_current_status() {
    let catalog = open().await;
    let owner = landlord(&catalog).await;
    let renter = tenant(&catalog, "Ria").await;
    let property = catalog
        .properties()
        .create(&owner.id, draft("Studio", "Downtown", 950.0, 0, 1.0))
        .await
        .unwrap();

    let receipt = catalog.rentals().rent(&property.id, &renter.id).await.unwrap();
    assert_eq!(receipt.property_id, property.id);
    assert_eq!(receipt.tenant_id, renter.id);

    let err = catalog.rentals().rent(&property.id, &renter.id).await.unwrap_err();
    assert!(matches!(err, Error::NotAvailable { status: PropertyStatus::Rented, .. }));
}

#[tokio::test]
async fn maintenance_and_missing_properties_are_refused() {
    let catalog = open().await;
    let owner = landlord(&catalog).await;
    let renter = tenant(&catalog, "Max").await;
    let mut d = draft("Fixer", "Downtown", 700.0, 1, 1.0);
    d.status = PropertyStatus::Maintenance;
    let property = catalog.properties().create(&owner.id, d).await.unwrap();

    let err = catalog.rentals().rent(&property.id, &renter.id).await.unwrap_err();
    assert!(matches!(err, Error::NotAvailable { status: PropertyStatus::Maintenance, .. }));

    let err = catalog.rentals().rent("missing", &renter.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { entity: "property", .. }));
}

#[tokio::test]
async fn rejected_ledger_write_leaves_the_unit_available() {
    let catalog = open().await;
    let owner = landlord(&catalog).await;
    let property = catalog
        .properties()
        .create(&owner.id, draft("Loft", "Downtown", 1500.0, 1, 1.0))
        .await
        .unwrap();

    let err = catalog.rentals().rent(&property.id, "ghost-tenant").await.unwrap_err();
    assert!(err.is_persistence(), "{err:?}");

    let stored = catalog.properties().get(&property.id).await.unwrap();
    assert_eq!(stored.status, PropertyStatus::Available);
}
