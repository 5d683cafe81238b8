use flowguard::base::{BlockError, BlockType, EntryStrongPtr};
use flowguard::context::{self, DefaultOriginParser};
use flowguard::utils::AsAny;
use flowguard::{authority, EntryBuilder, Result};
use std::sync::Arc;

fn entry_from(res: &str, origin: &str) -> Result<EntryStrongPtr> {
    EntryBuilder::new(res.into())
        .with_context(context::new_context("it_authority_ctx", origin))
        .build()
}

#[test]
fn white_list() {
    let res = "it_authority_white";
    authority::load_rules_of_resource(
        res,
        vec![Arc::new(authority::Rule {
            resource: res.into(),
            strategy: authority::AuthorityStrategy::WhiteList,
            limit_origins: vec!["app-a".into()],
            ..Default::default()
        })],
    )
    .unwrap();

    entry_from(res, "app-a").unwrap().exit().unwrap();
    let err = entry_from(res, "app-b").unwrap_err();
    let block_err = BlockError::from_error(&err).unwrap();
    assert_eq!(block_err.block_type(), BlockType::Authority);
    let origin = block_err.triggered_value().unwrap();
    assert_eq!(
        (*origin).as_any().downcast_ref::<String>(),
        Some(&"app-b".to_owned())
    );
    // unknown callers pass
    entry_from(res, "").unwrap().exit().unwrap();
    authority::clear_rules_of_resource(res);
}

#[test]
fn black_list_with_parser() {
    let res = "it_authority_black";
    authority::load_rules_of_resource(
        res,
        vec![Arc::new(authority::Rule {
            resource: res.into(),
            strategy: authority::AuthorityStrategy::BlackList,
            limit_origins: vec!["app-b".into()],
            ..Default::default()
        })],
    )
    .unwrap();

    let parser = |req: &str| req.split(':').nth(1).unwrap_or_default().to_owned();
    context::enter_with_parser("it_authority_parsed", "10.0.0.2:app-b", &parser);
    let err = EntryBuilder::new(res.into()).build().unwrap_err();
    assert_eq!(
        BlockError::from_error(&err).unwrap().block_type(),
        BlockType::Authority
    );
    context::exit();

    // the default parser yields no origin
    context::enter_with_parser("it_authority_default_parser", "app-b", &DefaultOriginParser);
    EntryBuilder::new(res.into()).build().unwrap().exit().unwrap();
    assert!(context::current().is_none());
    authority::clear_rules_of_resource(res);
}
