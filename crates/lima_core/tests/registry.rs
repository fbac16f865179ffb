use lima_core::{
    open_db_in_memory, AddressDelta, AddressQuery, AddressService, AuditService, CoreError,
    GeoBounds, ManualClock, NewAddress, NewHolder, NewOperator, OpOptions, Principal, QueryKind,
    RegistryService, SharedClock, ValidationError,
};
use std::sync::Arc;

fn clock() -> SharedClock {
    Arc::new(ManualClock::starting_at(1_000))
}

fn site(code: &str, latitude: f64, longitude: f64) -> NewAddress {
    let mut address = NewAddress::new(code, "RN", "Natal", "Tirol", "Av. Hermes da Fonseca");
    address.latitude = Some(latitude);
    address.longitude = Some(longitude);
    address
}

#[test]
fn only_super_users_register_holders_and_operators() {
    let conn = open_db_in_memory().unwrap();
    let registry = RegistryService::new(&conn, clock());
    let admin = Principal::super_user(1);
    let editor = Principal::intermediate(2);

    assert!(matches!(
        registry.create_holder(&editor, &NewHolder::new("SBA", "SBA Torres", "0800 100")),
        Err(CoreError::Permission { .. })
    ));
    let holder = registry
        .create_holder(&admin, &NewHolder::new("SBA", "SBA Torres", "0800 100"))
        .unwrap();
    assert!(matches!(
        registry.create_holder(&admin, &NewHolder::new("sba", "Duplicate", "1")),
        Err(CoreError::Conflict(_))
    ));
    assert_eq!(
        registry.get_holder_by_code(&Principal::basic(3), "Sba").unwrap(),
        Some(holder.clone())
    );
    assert_eq!(registry.get_holder(&editor, holder.id).unwrap(), holder);

    assert!(matches!(
        registry.create_operator(&editor, &NewOperator::new("TIM", "TIM Brasil")),
        Err(CoreError::Permission { .. })
    ));
    registry
        .create_operator(&admin, &NewOperator::new("TIM", "TIM Brasil"))
        .unwrap();
    assert_eq!(registry.list_operators(&editor, None).unwrap().len(), 1);
}

#[test]
fn operator_links_require_edit_rights_and_an_active_address() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let registry = RegistryService::new(&conn, clock.clone());
    let addresses = AddressService::new(&conn, clock);
    let admin = Principal::super_user(1);
    let editor = Principal::intermediate(2);

    registry
        .create_operator(&admin, &NewOperator::new("VIVO", "Vivo"))
        .unwrap();
    let record = addresses
        .create(&editor, &site("rnnt20", -5.79, -35.2), OpOptions::default())
        .unwrap();

    assert!(matches!(
        registry.link_operator(&Principal::basic(9), record.id, "VIVO", "NTL001", OpOptions::default()),
        Err(CoreError::Permission { .. })
    ));
    assert!(matches!(
        registry.link_operator(&editor, record.id, "OI", "NTL001", OpOptions::default()),
        Err(CoreError::Validation(ValidationError::InvalidField { field: "operator", .. }))
    ));

    let link = registry
        .link_operator(&editor, record.id, "vivo", "NTL001", OpOptions::default())
        .unwrap();
    assert_eq!(link.operator.code, "VIVO");
    assert!(matches!(
        registry.link_operator(&editor, record.id, "VIVO", "NTL002", OpOptions::default()),
        Err(CoreError::Conflict(_))
    ));
    assert_eq!(
        registry.operators_for_address(&Principal::basic(9), record.id).unwrap(),
        vec![link]
    );

    // Links do not touch the record version.
    assert_eq!(addresses.get(&editor, record.id).unwrap().version, 1);

    registry
        .unlink_operator(&editor, record.id, "VIVO", OpOptions::default())
        .unwrap();
    assert!(matches!(
        registry.unlink_operator(&editor, record.id, "VIVO", OpOptions::default()),
        Err(CoreError::NotFound(_))
    ));

    addresses.remove(&editor, record.id, OpOptions::default()).unwrap();
    assert!(matches!(
        registry.link_operator(&editor, record.id, "VIVO", "NTL001", OpOptions::default()),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn search_by_operator_holder_and_coordinates() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let registry = RegistryService::new(&conn, clock.clone());
    let addresses = AddressService::new(&conn, clock);
    let admin = Principal::super_user(1);
    let editor = Principal::intermediate(2);

    let holder = registry
        .create_holder(&admin, &NewHolder::new("ATC", "American Tower", "0800 200"))
        .unwrap();
    registry
        .create_operator(&admin, &NewOperator::new("CLARO", "Claro"))
        .unwrap();

    let mut downtown = site("rnnt30", -5.79, -35.21);
    downtown.holder_id = Some(holder.id);
    let downtown = addresses
        .create(&editor, &downtown, OpOptions::default())
        .unwrap();
    let far = addresses
        .create(&editor, &site("rnmo31", -5.19, -37.34), OpOptions::default())
        .unwrap();
    addresses
        .create(
            &editor,
            &NewAddress::new("rnnt32", "RN", "Natal", "Tirol", "Rua Sem GPS"),
            OpOptions::default(),
        )
        .unwrap();
    registry
        .link_operator(&editor, downtown.id, "CLARO", "RN_NTL_0042", OpOptions::default())
        .unwrap();
    registry
        .link_operator(&editor, far.id, "CLARO", "RN_MOS_0007", OpOptions::default())
        .unwrap();

    let by_operator = AddressQuery {
        operator_code: Some("ntl_".to_string()),
        ..AddressQuery::default()
    };
    let found: Vec<i64> = addresses
        .search(&editor, &by_operator)
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(found, vec![downtown.id]);

    let by_holder = AddressQuery {
        holder_code: Some("atc".to_string()),
        ..AddressQuery::default()
    };
    assert_eq!(addresses.search(&editor, &by_holder).unwrap().len(), 1);

    let natal_window = AddressQuery {
        bounds: Some(GeoBounds {
            south: -5.95,
            west: -35.35,
            north: -5.70,
            east: -35.15,
        }),
        ..AddressQuery::default()
    };
    let in_window = addresses.search(&editor, &natal_window).unwrap();
    assert_eq!(in_window.len(), 1);
    assert_eq!(in_window[0].id, downtown.id);

    let inverted = AddressQuery {
        bounds: Some(GeoBounds {
            south: -5.70,
            west: -35.35,
            north: -5.95,
            east: -35.15,
        }),
        ..AddressQuery::default()
    };
    assert!(matches!(
        addresses.search(&editor, &inverted),
        Err(CoreError::Validation(ValidationError::InvalidField { field: "bounds", .. }))
    ));

    let stats = AuditService::new(&conn).search_stats(&editor).unwrap();
    assert_eq!(stats.get(&QueryKind::ByOperator), Some(&1));
    assert_eq!(stats.get(&QueryKind::ByHolder), Some(&1));
    assert_eq!(stats.get(&QueryKind::ByCoordinates), Some(&1));
}

#[test]
fn holder_id_must_name_a_registered_holder() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let registry = RegistryService::new(&conn, clock.clone());
    let addresses = AddressService::new(&conn, clock);
    let editor = Principal::intermediate(2);

    let mut orphan = site("rnnt40", -5.8, -35.2);
    orphan.holder_id = Some(77);
    assert!(matches!(
        addresses.create(&editor, &orphan, OpOptions::default()),
        Err(CoreError::Validation(ValidationError::InvalidField { field: "holder_id", .. }))
    ));

    let record = addresses
        .create(&editor, &site("rnnt40", -5.8, -35.2), OpOptions::default())
        .unwrap();
    let reassign = AddressDelta {
        holder_id: Some(77),
        ..AddressDelta::default()
    };
    assert!(matches!(
        addresses.update(&editor, record.id, &reassign, None, OpOptions::default()),
        Err(CoreError::Validation(_))
    ));

    let holder = registry
        .create_holder(&Principal::super_user(1), &NewHolder::new("SBA", "SBA Torres", "0800"))
        .unwrap();
    let reassign = AddressDelta {
        holder_id: Some(holder.id),
        ..AddressDelta::default()
    };
    let updated = addresses
        .update(&editor, record.id, &reassign, None, OpOptions::default())
        .unwrap();
    assert_eq!(updated.holder_id, Some(holder.id));
}

#[test]
fn purge_drops_operator_links() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let registry = RegistryService::new(&conn, clock.clone());
    let addresses = AddressService::new(&conn, clock);
    let admin = Principal::super_user(1);

    registry
        .create_operator(&admin, &NewOperator::new("TIM", "TIM Brasil"))
        .unwrap();
    let record = addresses
        .create(&admin, &site("rnnt50", -5.8, -35.2), OpOptions::default())
        .unwrap();
    registry
        .link_operator(&admin, record.id, "TIM", "NTL050", OpOptions::default())
        .unwrap();

    addresses.purge(&admin, record.id, OpOptions::default()).unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM address_operators;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}
