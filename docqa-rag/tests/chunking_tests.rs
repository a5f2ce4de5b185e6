//! Property tests for sliding-window chunking.

use docqa_rag::chunking::split_pages;
use docqa_rag::document::Page;
use proptest::prelude::*;

/// Pages of short mixed-script text, some of them empty.
fn arb_pages() -> impl Strategy<Value = Vec<Page>> {
    proptest::collection::vec("[a-zé ]{0,40}", 1..6).prop_map(|texts| {
        texts.into_iter().enumerate().map(|(i, text)| Page::new(i as u32 + 1, text)).collect()
    })
}

/// `(chunk_size, chunk_overlap)` with `overlap < size`.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (1usize..30).prop_flat_map(|size| (Just(size), 0..size))
}

/// Rebuild the full text from chunks by dropping each chunk's overlap with
/// the previous one.
fn reassemble(chunks: &[docqa_rag::Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0;
    for chunk in chunks {
        let skip = covered - chunk.start_offset;
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.start_offset + chunk.text.chars().count();
    }
    out
}

mod prop_chunk_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reassemble_to_the_page_text(
            pages in arb_pages(),
            (size, overlap) in arb_window(),
        ) {
            let full: String = pages.iter().map(|p| p.text.as_str()).collect();
            let chunks = split_pages("doc", &pages, size, overlap).unwrap();

            prop_assert_eq!(reassemble(&chunks), full.clone());
            if full.is_empty() {
                prop_assert!(chunks.is_empty());
            }
        }

        #[test]
        fn windows_advance_by_step_and_only_the_last_is_short(
            pages in arb_pages(),
            (size, overlap) in arb_window(),
        ) {
            let chunks = split_pages("doc", &pages, size, overlap).unwrap();
            let step = size - overlap;

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index, i);
                prop_assert_eq!(chunk.start_offset, i * step);
                prop_assert_eq!(chunk.id.clone(), format!("doc_{i}"));
                let len = chunk.text.chars().count();
                prop_assert!(len >= 1 && len <= size);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(len, size);
                }
            }
        }

        #[test]
        fn page_number_is_the_page_holding_the_first_character(
            pages in arb_pages(),
            (size, overlap) in arb_window(),
        ) {
            let chunks = split_pages("doc", &pages, size, overlap).unwrap();

            let mut owner = Vec::new();
            for page in &pages {
                owner.extend(std::iter::repeat_n(page.number, page.text.chars().count()));
            }
            for chunk in &chunks {
                prop_assert_eq!(chunk.page_number, owner[chunk.start_offset]);
            }
        }

        #[test]
        fn chunking_is_deterministic(pages in arb_pages(), (size, overlap) in arb_window()) {
            let first = split_pages("doc", &pages, size, overlap).unwrap();
            let second = split_pages("doc", &pages, size, overlap).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn resplitting_reassembled_text_keeps_the_boundaries(
            pages in arb_pages(),
            (size, overlap) in arb_window(),
        ) {
            let chunks = split_pages("doc", &pages, size, overlap).unwrap();
            let rebuilt = [Page::new(1, reassemble(&chunks))];
            let again = split_pages("doc", &rebuilt, size, overlap).unwrap();

            let windows = |chunks: &[docqa_rag::Chunk]| {
                chunks.iter().map(|c| (c.start_offset, c.text.clone())).collect::<Vec<_>>()
            };
            prop_assert_eq!(windows(&chunks), windows(&again));
        }
    }
}
