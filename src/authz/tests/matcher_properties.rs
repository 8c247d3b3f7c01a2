//! Property tests for wildcard matching and expression rendering

use proptest::prelude::*;
use rpc_authz::expression::{render, EvalContext};
use rpc_authz::{is_valid_expression, permission_match};
use serde_json::json;

proptest! {
    #[test]
    fn prop_literal_permission_matches_itself(held in "[a-zA-Z0-9_:/.+?()|-]{1,40}") {
        prop_assert!(permission_match(&held, &held).unwrap());
    }

    #[test]
    fn prop_lone_wildcard_matches_any_permission_chars(
        required in "[a-zA-Z0-9_/.-]{0,40}"
    ) {
        prop_assert!(permission_match(&required, "*").unwrap());
    }

    #[test]
    fn prop_wildcard_segment_is_anchored(
        prefix in "[a-z]{1,8}",
        middle in "[a-zA-Z0-9_/.-]{0,20}",
        action in "[a-z]{1,8}",
    ) {
        let required = format!("{}:{}:{}", prefix, middle, action);
        let held = format!("{}:*:{}", prefix, action);
        prop_assert!(permission_match(&required, &held).unwrap());

        let shifted = format!("x{}", required);
        prop_assert!(!permission_match(&shifted, &held).unwrap());

        let extended = format!("{}:x", required);
        prop_assert!(!permission_match(&extended, &held).unwrap());
    }

    #[test]
    fn prop_literal_templates_render_unchanged(template in "[a-zA-Z0-9_:/.{}$-]{0,40}") {
        prop_assume!(!template.contains("${"));
        prop_assert!(is_valid_expression(&template).is_ok());
        prop_assert_eq!(render(&template, &EvalContext::new()).unwrap(), template);
    }

    #[test]
    fn prop_request_field_substitution(
        namespace in "[a-z0-9-]{1,12}",
        name in "[a-z0-9-]{1,12}",
    ) {
        let request = json!({ "Namespace": namespace, "Name": name });
        let ctx = EvalContext::new().with_request(&request);

        let rendered = render("app:${request.Namespace}/${request.Name}.add", &ctx).unwrap();
        prop_assert_eq!(rendered, format!("app:{}/{}.add", namespace, name));
    }
}
