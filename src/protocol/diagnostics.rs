//! Bib-1 diagnostic condition messages.

const BIB1_MESSAGES: &[(i64, &str)] = &[
    (1, "Permanent system error"),
    (2, "Temporary system error"),
    (3, "Unsupported search"),
    (4, "Terms only exclusion (stop) words"),
    (5, "Too many argument words"),
    (6, "Too many boolean operators"),
    (7, "Too many truncated words"),
    (8, "Too many incomplete subfields"),
    (9, "Truncated words too short"),
    (10, "Invalid format for record number (search term)"),
    (11, "Too many characters in search statement"),
    (12, "Too many records retrieved"),
    (13, "Present request out-of-range"),
    (14, "System error in presenting records"),
    (15, "Record not authorized to be sent intersystem"),
    (16, "Record exceeds Preferred-message-size"),
    (17, "Record exceeds Exceptional-record-size"),
    (18, "Result set not supported as a search term"),
    (19, "Only single result set as search term supported"),
    (20, "Only ANDing of a single result set as search term"),
    (21, "Result set exists and replace indicator off"),
    (22, "Result set naming not supported"),
    (23, "Specified combination of databases not supported"),
    (24, "Element set names not supported"),
    (25, "Specified element set name not valid for specified database"),
    (26, "Only generic form of element set name supported"),
    (27, "Result set no longer exists - unilaterally deleted by target"),
    (28, "Result set is in use"),
    (29, "One of the specified databases is locked"),
    (30, "Specified result set does not exist"),
    (31, "Resources exhausted - no results available"),
    (32, "Resources exhausted - unpredictable partial results available"),
    (33, "Resources exhausted - valid subset of results available"),
    (100, "Unspecified error"),
    (101, "Access-control failure"),
    (102, "Challenge required, could not be issued - operation terminated"),
    (103, "Challenge required, could not be issued - record not included"),
    (104, "Challenge failed - record not included"),
    (105, "Terminated at origin request"),
    (106, "No abstract syntaxes agreed to for this record"),
    (107, "Query type not supported"),
    (108, "Malformed query"),
    (109, "Database unavailable"),
    (110, "Operator unsupported"),
    (111, "Too many databases specified"),
    (112, "Too many result sets created"),
    (113, "Unsupported attribute type"),
    (114, "Unsupported Use attribute"),
    (115, "Unsupported term value for Use attribute"),
    (116, "Use attribute required but not supplied"),
    (117, "Unsupported Relation attribute"),
    (118, "Unsupported Structure attribute"),
    (119, "Unsupported Position attribute"),
    (120, "Unsupported Truncation attribute"),
    (121, "Unsupported Attribute Set"),
    (122, "Unsupported Completeness attribute"),
    (123, "Unsupported attribute combination"),
    (124, "Unsupported coded value for term"),
    (125, "Malformed search term"),
    (126, "Illegal term value for attribute"),
    (127, "Unparsable format for un-normalized value"),
    (128, "Illegal result set name"),
    (129, "Proximity search of sets not supported"),
    (130, "Illegal result set in proximity search"),
    (131, "Unsupported proximity relation"),
    (132, "Unsupported proximity unit code"),
    (201, "Proximity not supported with this attribute combination"),
    (202, "Unsupported distance for proximity"),
    (203, "Ordered flag not supported for proximity"),
    (205, "Only zero step size supported for Scan"),
    (206, "Specified step size not supported for Scan"),
    (207, "Cannot sort according to sequence"),
    (208, "No result set name supplied on Sort"),
    (227, "No data available in requested record syntax"),
    (228, "Unsupported schema"),
    (229, "Unsupported element set name"),
    (230, "Unsupported element"),
    (233, "Operator unsupported"),
    (235, "Database does not exist"),
    (236, "Access to specified database denied"),
    (238, "Record not available in requested syntax"),
    (239, "Record syntax not supported"),
    (1005, "Init/AC: Bad userid and/or password"),
    (1016, "Init/AC: Authentication failed"),
    (1023, "Init/AC: Bad userid"),
];

/// Message for a Bib-1 diagnostic condition, if the condition is registered.
pub fn bib1_message(condition: i64) -> Option<&'static str> {
    BIB1_MESSAGES
        .binary_search_by_key(&condition, |&(code, _)| code)
        .ok()
        .map(|i| BIB1_MESSAGES[i].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(BIB1_MESSAGES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_known_conditions() {
        assert_eq!(bib1_message(1), Some("Permanent system error"));
        assert_eq!(bib1_message(114), Some("Unsupported Use attribute"));
        assert_eq!(bib1_message(239), Some("Record syntax not supported"));
    }

    #[test]
    fn test_unknown_condition() {
        assert_eq!(bib1_message(0), None);
        assert_eq!(bib1_message(99_999), None);
    }
}
