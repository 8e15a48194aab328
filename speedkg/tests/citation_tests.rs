use pretty_assertions::assert_eq;
use proptest::prelude::*;

use speedkg::intelligence::extract_citations;

#[test]
fn test_structured_answer() {
    let answer = "\
**Answer**: The 1950 strike (EID4521) was initiated by the army and followed \
EID4519.

**Evidence**:
- EID4521: military strike, 1950

**Citations**:
- Events: EID4521, EID4519
- Actors: Army
";
    assert_eq!(
        extract_citations(answer),
        vec![
            "EID4521",
            "EID4519",
            "Events: EID4521, EID4519",
            "Actors: Army",
        ]
    );
}

#[test]
fn test_malformed_section_keeps_inline_ids() {
    let answer = "EID1 and EID2 happened.\n\nCitations: see above, no list here";
    assert_eq!(extract_citations(answer), vec!["EID1", "EID2"]);
}

#[test]
fn test_no_identifiers_yields_empty_set() {
    assert!(extract_citations("The data does not contain matching events.").is_empty());
    assert!(extract_citations("").is_empty());
}

proptest! {
    #[test]
    fn prop_embedded_identifier_is_extracted(
        id in 1u32..10_000_000,
        prefix in "[a-z ,.]{0,40}",
        suffix in "[a-z ,.]{0,40}",
    ) {
        let answer = format!("{prefix} EID{id} {suffix}");
        prop_assert_eq!(extract_citations(&answer), vec![format!("EID{id}")]);
    }

    #[test]
    fn prop_extraction_never_panics(answer in "\\PC{0,300}") {
        let citations = extract_citations(&answer);
        let unique: std::collections::HashSet<_> = citations.iter().collect();
        prop_assert_eq!(unique.len(), citations.len());
    }
}
