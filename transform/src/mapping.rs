//! Bidirectional offset mapping between original documents and a backing
//! module.
//!
//! A table is a flat list of segments built in one pass while the backing
//! module is written. Segments never overlap in synthetic space and are
//! stored in synthetic order, so both directions are binary searches.

use trellis_types::{SourceId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Usable in both directions.
    Both,
    /// A synthetic anchor that reports back to original text but is never a
    /// target of original-to-synthetic queries.
    ToOriginal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub source: SourceId,
    pub original: Span,
    pub synthetic: Span,
    pub direction: Direction,
}

impl Segment {
    fn same_length(&self) -> bool {
        self.original.len() == self.synthetic.len()
    }
}

/// Which segment an offset on a segment boundary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Prefer the segment ending at the offset (a cursor just after a name).
    Left,
    /// Prefer the segment starting at the offset.
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    /// Sorted by synthetic position.
    segments: Vec<Segment>,
    /// Indices of `Both` segments sorted by `(source, original, synthetic)`.
    by_original: Vec<usize>,
}

impl MappingTable {
    #[must_use]
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Original range for a synthetic range.
    ///
    /// An exact segment maps to its original span. A range inside one segment
    /// of equal lengths maps linearly. Anything else maps to the smallest
    /// original span covering every overlapping segment from the first
    /// overlapping segment's source. `None` means the range touches only
    /// scaffolding.
    #[must_use]
    pub fn synthetic_to_original(&self, span: Span) -> Option<(SourceId, Span)> {
        let first = self
            .segments
            .partition_point(|seg| seg.synthetic.end <= span.start);
        let overlapping: Vec<&Segment> = self.segments[first..]
            .iter()
            .take_while(|seg| seg.synthetic.start < span.end.max(span.start + 1))
            .filter(|seg| touches(seg.synthetic, span))
            .collect();

        let (&head, rest) = overlapping.split_first()?;
        if rest.is_empty() {
            if head.synthetic == span {
                return Some((head.source, head.original));
            }
            if head.synthetic.contains(span) {
                if head.same_length() {
                    let start = head.original.start + (span.start - head.synthetic.start);
                    return Some((head.source, Span::new(start, start + span.len())));
                }
                return Some((head.source, head.original));
            }
        }

        let covered = overlapping
            .iter()
            .filter(|seg| seg.source == head.source)
            .map(|seg| seg.original)
            .fold(head.original, Span::cover);
        Some((head.source, covered))
    }

    /// Synthetic offset for an offset in an original source.
    ///
    /// Only `Both` segments participate. Within a segment of equal lengths
    /// the offset maps linearly; otherwise it clamps to the segment's end.
    #[must_use]
    pub fn original_to_synthetic(&self, source: SourceId, offset: usize, bias: Bias) -> Option<usize> {
        let key = |i: usize| {
            let seg = &self.segments[i];
            (seg.source, seg.original.start)
        };
        let upper = self
            .by_original
            .partition_point(|&i| key(i) <= (source, offset));
        let candidate = |pos: usize| -> Option<&Segment> {
            let &i = self.by_original.get(pos)?;
            let seg = &self.segments[i];
            (seg.source == source).then_some(seg)
        };

        let at_or_before = upper.checked_sub(1).and_then(|pos| {
            // Identical original spans map to the earliest synthetic copy.
            let seg = candidate(pos)?;
            let mut first = pos;
            while first > 0
                && candidate(first - 1).is_some_and(|prev| prev.original == seg.original)
            {
                first -= 1;
            }
            candidate(first).map(|seg| (first, seg))
        });

        let chosen = match (bias, at_or_before) {
            (_, None) => None,
            (Bias::Left, Some((pos, seg))) => {
                let ending_here = pos
                    .checked_sub(1)
                    .and_then(&candidate)
                    .filter(|prev| seg.original.start == offset && prev.original.end == offset);
                ending_here.or(Some(seg))
            }
            (Bias::Right, Some((_, seg))) => Some(seg),
        }?;

        if offset > chosen.original.end {
            return None;
        }
        let delta = offset - chosen.original.start;
        if chosen.same_length() {
            Some(chosen.synthetic.start + delta)
        } else {
            Some(chosen.synthetic.start + delta.min(chosen.synthetic.len()))
        }
    }
}

/// Zero-width spans touch the segment that contains their offset.
fn touches(segment: Span, span: Span) -> bool {
    if span.is_empty() {
        segment.start <= span.start && span.start < segment.end
    } else {
        segment.start < span.end && span.start < segment.end
    }
}

/// Append-only builder; segments must arrive in synthetic order.
#[derive(Debug, Default)]
pub struct MappingBuilder {
    segments: Vec<Segment>,
}

impl MappingBuilder {
    pub fn push(&mut self, segment: Segment) {
        if segment.synthetic.is_empty() {
            return;
        }
        if let Some(last) = self.segments.last()
            && last.synthetic.end > segment.synthetic.start
        {
            debug_assert!(false, "mapping segments out of synthetic order");
            tracing::warn!(
                previous = %last.synthetic,
                next = %segment.synthetic,
                "Dropping out-of-order mapping segment"
            );
            return;
        }
        self.segments.push(segment);
    }

    #[must_use]
    pub fn finish(self) -> MappingTable {
        let segments = self.segments;
        let mut by_original: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, seg)| seg.direction == Direction::Both)
            .map(|(i, _)| i)
            .collect();
        by_original.sort_by_key(|&i| {
            let seg = &segments[i];
            (seg.source, seg.original.start, seg.original.end, seg.synthetic.start)
        });
        MappingTable {
            segments,
            by_original,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: SourceId = SourceId::PRIMARY;

    fn seg(original: (usize, usize), synthetic: (usize, usize)) -> Segment {
        Segment {
            source: SRC,
            original: Span::new(original.0, original.1),
            synthetic: Span::new(synthetic.0, synthetic.1),
            direction: Direction::Both,
        }
    }

    fn table(segments: &[Segment]) -> MappingTable {
        let mut builder = MappingTable::builder();
        for s in segments {
            builder.push(*s);
        }
        builder.finish()
    }

    fn sample() -> MappingTable {
        table(&[
            // `foo` -> `foo`
            seg((2, 5), (20, 23)),
            // `@bar` -> `bar` in `__ctx.args.bar`
            seg((7, 10), (36, 39)),
            // `"x"` -> `"x"`
            seg((11, 14), (41, 44)),
        ])
    }

    // ── synthetic -> original ───────────────────────────────────────────

    #[test]
    fn test_every_segment_round_trips() {
        let table = sample();
        for segment in table.segments() {
            assert_eq!(
                table.synthetic_to_original(segment.synthetic),
                Some((segment.source, segment.original))
            );
        }
    }

    #[test]
    fn test_sub_span_maps_linearly() {
        let table = sample();
        assert_eq!(
            table.synthetic_to_original(Span::new(21, 23)),
            Some((SRC, Span::new(3, 5)))
        );
        assert_eq!(
            table.synthetic_to_original(Span::empty(22)),
            Some((SRC, Span::new(4, 4)))
        );
    }

    #[test]
    fn test_range_across_segments_covers_them() {
        let table = sample();
        // From inside `foo` to the end of `"x"`, across scaffolding.
        assert_eq!(
            table.synthetic_to_original(Span::new(15, 50)),
            Some((SRC, Span::new(2, 14)))
        );
        assert_eq!(
            table.synthetic_to_original(Span::new(37, 42)),
            Some((SRC, Span::new(7, 14)))
        );
    }

    #[test]
    fn test_partial_overlap_of_one_segment_returns_whole_original() {
        let table = sample();
        assert_eq!(
            table.synthetic_to_original(Span::new(18, 21)),
            Some((SRC, Span::new(2, 5)))
        );
    }

    #[test]
    fn test_scaffolding_has_no_original() {
        let table = sample();
        assert_eq!(table.synthetic_to_original(Span::new(0, 20)), None);
        assert_eq!(table.synthetic_to_original(Span::new(23, 36)), None);
        assert_eq!(table.synthetic_to_original(Span::empty(23)), None);
        assert_eq!(table.synthetic_to_original(Span::new(100, 120)), None);
    }

    #[test]
    fn test_unequal_lengths_map_to_whole_original() {
        // `foo` -> `__reg.Globals["foo"]`
        let table = table(&[seg((0, 3), (10, 30))]);
        assert_eq!(
            table.synthetic_to_original(Span::new(12, 14)),
            Some((SRC, Span::new(0, 3)))
        );
    }

    #[test]
    fn test_cover_stays_within_first_source() {
        let other = SourceId::new(1);
        let table = table(&[
            seg((0, 10), (0, 10)),
            Segment {
                source: other,
                original: Span::new(50, 55),
                synthetic: Span::new(12, 17),
                direction: Direction::Both,
            },
            seg((20, 24), (20, 24)),
        ]);
        assert_eq!(
            table.synthetic_to_original(Span::new(5, 22)),
            Some((SRC, Span::new(0, 24)))
        );
    }

    #[test]
    fn test_to_original_segments_map_back() {
        let table = table(&[Segment {
            source: SRC,
            original: Span::new(30, 36),
            synthetic: Span::new(100, 124),
            direction: Direction::ToOriginal,
        }]);
        assert_eq!(
            table.synthetic_to_original(Span::new(100, 124)),
            Some((SRC, Span::new(30, 36)))
        );
        assert_eq!(table.original_to_synthetic(SRC, 32, Bias::Right), None);
    }

    // ── original -> synthetic ───────────────────────────────────────────

    #[test]
    fn test_original_offsets_map_linearly() {
        let table = sample();
        assert_eq!(table.original_to_synthetic(SRC, 2, Bias::Right), Some(20));
        assert_eq!(table.original_to_synthetic(SRC, 4, Bias::Right), Some(22));
        assert_eq!(table.original_to_synthetic(SRC, 8, Bias::Left), Some(37));
    }

    #[test]
    fn test_offsets_outside_segments_are_unmapped() {
        let table = sample();
        assert_eq!(table.original_to_synthetic(SRC, 0, Bias::Right), None);
        assert_eq!(table.original_to_synthetic(SRC, 6, Bias::Right), None);
        assert_eq!(table.original_to_synthetic(SourceId::new(3), 3, Bias::Right), None);
    }

    #[test]
    fn test_segment_end_is_reachable() {
        let table = sample();
        assert_eq!(table.original_to_synthetic(SRC, 5, Bias::Left), Some(23));
        assert_eq!(table.original_to_synthetic(SRC, 5, Bias::Right), Some(23));
    }

    #[test]
    fn test_bias_on_shared_boundary() {
        // `a` then `b`, adjacent in original, apart in synthetic.
        let table = table(&[seg((0, 1), (10, 11)), seg((1, 2), (20, 21))]);
        assert_eq!(table.original_to_synthetic(SRC, 1, Bias::Left), Some(11));
        assert_eq!(table.original_to_synthetic(SRC, 1, Bias::Right), Some(20));
    }

    #[test]
    fn test_unequal_lengths_clamp() {
        let table = table(&[seg((0, 10), (50, 53))]);
        assert_eq!(table.original_to_synthetic(SRC, 1, Bias::Right), Some(51));
        assert_eq!(table.original_to_synthetic(SRC, 8, Bias::Right), Some(53));
    }

    #[test]
    fn test_duplicate_original_prefers_first_synthetic_copy() {
        let table = table(&[seg((4, 7), (10, 13)), seg((4, 7), (30, 33))]);
        assert_eq!(table.original_to_synthetic(SRC, 5, Bias::Right), Some(11));
    }

    #[test]
    fn test_builder_drops_empty_segments() {
        let table = table(&[seg((0, 0), (5, 5)), seg((0, 1), (5, 6))]);
        assert_eq!(table.len(), 1);
    }
}
