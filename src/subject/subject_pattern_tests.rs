use super::{SubjectError, SubjectPath, SubjectPattern, SubjectToken, limits};

#[test]
fn test_parse_pattern() {
	let pattern = SubjectPattern::new("GMSEC.*.MSG.>").unwrap();

	assert_eq!(pattern.as_str(), "GMSEC.*.MSG.>");
	assert_eq!(pattern.tokens().len(), 4);
	assert_eq!(pattern.tokens()[1], SubjectToken::Star);
	assert_eq!(pattern.tokens()[3], SubjectToken::Greater);
	assert!(pattern.has_wildcards());
	assert!(!SubjectPattern::new("GMSEC.MSG").unwrap().has_wildcards());
}

#[test]
fn test_empty_pattern() {
	assert_eq!(SubjectPattern::new(""), Err(SubjectError::Empty));
	assert_eq!(SubjectPattern::new("   "), Err(SubjectError::Empty));
}

#[test]
fn test_empty_tokens() {
	for bad in ["A..B", ".A", "A."] {
		assert!(
			matches!(
				SubjectPattern::new(bad),
				Err(SubjectError::EmptyToken { .. })
			),
			"'{bad}' should be rejected"
		);
	}
}

#[test]
fn test_invalid_token_position() {
	let err = SubjectPattern::new("A.B$.C").unwrap_err();
	assert_eq!(err, SubjectError::invalid_token("B$", 1));
}

#[test]
fn test_trailing_wildcard_must_be_last() {
	assert_eq!(
		SubjectPattern::new("A.>.B"),
		Err(SubjectError::wildcard_position("A.>.B", '>'))
	);
	assert_eq!(
		SubjectPattern::new("A.+.B"),
		Err(SubjectError::wildcard_position("A.+.B", '+'))
	);
	assert!(SubjectPattern::new("A.*.B").is_ok());
}

#[test]
fn test_limits() {
	let deep = vec!["A"; limits::MAX_SUBJECT_DEPTH + 1].join(".");
	assert!(matches!(
		SubjectPattern::new(deep),
		Err(SubjectError::LimitExceeded { .. })
	));

	let long_token = "A".repeat(limits::MAX_TOKEN_LENGTH + 1);
	assert!(matches!(
		SubjectPattern::new(long_token),
		Err(SubjectError::LimitExceeded { .. })
	));
}

#[test]
fn test_pattern_matches_path() {
	let pattern = SubjectPattern::new("GMSEC.*.EVT").unwrap();

	assert!(pattern.matches(&SubjectPath::new("GMSEC.MISSION.EVT")));
	assert!(!pattern.matches(&SubjectPath::new("GMSEC.MISSION.SAT.EVT")));
	assert!(!pattern.matches(&SubjectPath::new("GMSEC.MISSION")));
}

#[test]
fn test_publish_subject_validation() {
	assert!(SubjectPath::for_publish("GMSEC.MISSION.SAT.MSG.HB").is_ok());
	assert!(matches!(
		SubjectPath::for_publish("GMSEC.*.HB"),
		Err(SubjectError::WildcardInSubject { .. })
	));
	assert!(matches!(
		SubjectPath::for_publish("GMSEC.>"),
		Err(SubjectError::WildcardInSubject { .. })
	));
	assert!(SubjectPath::for_publish("").is_err());
}

#[test]
fn test_subject_path_tokens_share_allocation() {
	let path = SubjectPath::new("A.BB.CCC");
	let tokens: Vec<&str> = path.tokens().iter().map(|t| t.as_str()).collect();

	assert_eq!(tokens, vec!["A", "BB", "CCC"]);
	assert_eq!(path.to_string(), "A.BB.CCC");
}
