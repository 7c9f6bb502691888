use arcstr::Substr;

use super::{SubjectError, SubjectToken};

#[test]
fn test_literal_token() {
	let token = SubjectToken::try_from(Substr::from("MISSION-1_A")).unwrap();

	assert_eq!(token, SubjectToken::Literal(Substr::from("MISSION-1_A")));
	assert_eq!(token.as_str(), "MISSION-1_A");
	assert!(!token.is_wildcard());
	assert!(!token.is_trailing_wildcard());
}

#[test]
fn test_wildcard_tokens() {
	let star = SubjectToken::try_from(Substr::from("*")).unwrap();
	let greater = SubjectToken::try_from(Substr::from(">")).unwrap();
	let plus = SubjectToken::try_from(Substr::from("+")).unwrap();

	assert_eq!(star, SubjectToken::Star);
	assert_eq!(greater, SubjectToken::Greater);
	assert_eq!(plus, SubjectToken::Plus);

	assert!(star.is_wildcard() && !star.is_trailing_wildcard());
	assert!(greater.is_trailing_wildcard());
	assert!(plus.is_trailing_wildcard());
	assert_eq!(greater.to_string(), ">");
}

#[test]
fn test_lowercase_literals_are_accepted() {
	assert!(SubjectToken::try_from(Substr::from("gmsec")).is_ok());
}

#[test]
fn test_invalid_tokens() {
	for bad in ["A*", "A>", "A+B", "A B", "A/B", "", "A#"] {
		let result = SubjectToken::try_from(Substr::from(bad));
		assert!(
			matches!(result, Err(SubjectError::InvalidToken { .. })),
			"'{bad}' should be rejected"
		);
	}
}
