//! Property-based tests for the record and key codecs and the store.

use comic_cache::codec::{MAX_KEY_LEN, decode_key, decode_record, encode_key, encode_record};
use comic_cache::{ComicRecord, MetadataStore};
use proptest::prelude::*;

// Strategy for generating printable titles and alt text
fn text() -> impl Strategy<Value = String> {
    ".{0,80}".prop_map(|s| s.to_string())
}

// Strategy for generating date fields, malformed ones included
fn date_part() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..=31).prop_map(|n| n.to_string()),
        Just(String::new()),
        "[a-z]{1,4}".prop_map(|s| s.to_string()),
    ]
}

fn comic_record() -> impl Strategy<Value = ComicRecord> {
    (
        any::<i64>(),
        text(),
        text(),
        text(),
        proptest::option::of(text()),
        proptest::option::of(text()),
        (date_part(), date_part(), date_part()),
    )
        .prop_map(|(number, title, image_url, alt, link, news, (year, month, day))| {
            ComicRecord {
                number,
                safe_title: title.clone(),
                title,
                image_url,
                alt,
                link,
                news,
                year,
                month,
                day,
                ..ComicRecord::default()
            }
        })
}

proptest! {
    #[test]
    fn key_roundtrip(number in any::<i64>()) {
        let key = encode_key(number);
        prop_assert!(!key.is_empty());
        prop_assert!(key.len() <= MAX_KEY_LEN);
        prop_assert_eq!(decode_key(&key), Ok(number));
    }

    #[test]
    fn small_magnitudes_use_one_byte(number in -64i64..64) {
        prop_assert_eq!(encode_key(number).len(), 1);
    }

    #[test]
    fn distinct_numbers_distinct_keys(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        prop_assert_ne!(encode_key(a), encode_key(b));
    }

    #[test]
    fn decode_key_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..16)) {
        let _ = decode_key(&bytes);
    }

    #[test]
    fn record_roundtrip(comic in comic_record()) {
        let bytes = encode_record(&comic).unwrap();
        let decoded = decode_record(&bytes).unwrap();
        prop_assert_eq!(decoded, comic);
    }

    #[test]
    fn formatted_date_is_empty_or_iso(comic in comic_record()) {
        let date = comic.formatted_date();
        prop_assert!(date.is_empty() || date.len() == 10);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_newest_is_max_number(numbers in prop::collection::vec(1i64..5000, 1..20)) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(temp_dir.path().join("comics.sqlite")).unwrap();

        for &number in &numbers {
            store
                .put_comic(&ComicRecord::placeholder(number, format!("Comic {}", number)))
                .unwrap();
        }

        let max = numbers.iter().copied().max().unwrap();
        let newest = store.newest_comic().unwrap().unwrap();
        prop_assert_eq!(newest.number, max);

        let mut distinct = numbers.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let stat = store.stat().unwrap();
        prop_assert_eq!(stat.cached, distinct.len());
        prop_assert_eq!(stat.latest, max);
    }
}
