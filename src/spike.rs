//! Detection of the largest daily page view spike of a page
//!
//! Hourly view counts are first collapsed into daily totals. Then every day is
//! scanned against a window of [`LOOKBACK_DAYS`] daily totals that ends with
//! the day itself, and the largest increase in daily views is retained.
//!
//! The window of day `i` holds `min(i, LOOKBACK_DAYS)` entries, the first of
//! which is day `i` itself. So day `i` is compared with at most the 4 days
//! before it, the second day is never compared with anything, and the first
//! day can never be the start of a spike.
//!
//! Only increases are considered: a page whose audience falls off a cliff has
//! no spike, whatever the size of the cliff.

use crate::{dataset::OrderedHours, Day, ViewCount};

/// Max number of daily totals in a spike scan window, including the scanned day
pub const LOOKBACK_DAYS: usize = 5;

/// Largest spike of a page
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SpikeResult<'entity> {
    /// Language code + page title
    pub entity: &'entity str,

    /// Day before the spike
    pub day1: Day,

    /// Day after the spike
    pub day2: Day,

    /// Increase in daily views between these two days
    pub magnitude: ViewCount,
}

/// Find the largest spike in the hourly data of a page
///
/// If the page views never increase from one day to a later one, the result
/// has a magnitude of 0 and both days are the first day of the data.
pub fn aggregate<'entity>(entity: &'entity str, hours: OrderedHours<'_>) -> SpikeResult<'entity> {
    let totals = DailyTotals::collapse(hours);
    let Spike {
        earlier,
        later,
        magnitude,
    } = totals.largest_spike();
    SpikeResult {
        entity,
        day1: totals.day(earlier),
        day2: totals.day(later),
        magnitude,
    }
}

/// Total number of views of a page on one day
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DailyTotal {
    pub day: Day,
    pub total: ViewCount,
}

/// Daily view totals of a page, in chronological order
///
/// Built from scratch for every page, so no state leaks from one page to the
/// next one.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DailyTotals(Box<[DailyTotal]>);
//
impl DailyTotals {
    /// Sum hourly view counts over each day
    ///
    /// Several counts for the same hour of the same day are summed as well.
    pub fn collapse(hours: OrderedHours<'_>) -> Self {
        let mut totals = Vec::<DailyTotal>::new();
        for hourly in hours.iter() {
            // Input is in chronological order, so a day can only match the
            // last day that was recorded
            match totals.last_mut() {
                Some(last) if last.day == hourly.day => {
                    last.total = last.total.saturating_add(hourly.view_count);
                }
                _ => totals.push(DailyTotal {
                    day: hourly.day,
                    total: hourly.view_count,
                }),
            }
        }
        Self(totals.into())
    }

    /// Daily totals, in chronological order
    #[cfg(test)]
    pub fn as_slice(&self) -> &[DailyTotal] {
        &self.0[..]
    }

    /// Day of the daily total with a certain index
    fn day(&self, index: usize) -> Day {
        self.0[index].day
    }

    /// Find the largest increase in daily views within the scan windows
    ///
    /// When several spikes have the same magnitude, the one which ends first
    /// wins, and among those, the one which starts last.
    pub fn largest_spike(&self) -> Spike {
        let mut best = Spike::default();
        for (later, current) in self.0.iter().enumerate() {
            // Scan the window, starting with the day itself then going back
            let window = later.min(LOOKBACK_DAYS);
            let mut local_best = Spike::default();
            for earlier in (0..window).map(|back| later - back) {
                let Some(increase) = current.total.checked_sub(self.0[earlier].total) else {
                    continue;
                };
                if increase > local_best.magnitude {
                    local_best = Spike {
                        earlier,
                        later,
                        magnitude: increase,
                    };
                }
            }
            if local_best.magnitude > best.magnitude {
                best = local_best;
            }
        }
        best
    }
}

/// Increase in daily views between two daily totals, designated by index
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Spike {
    pub earlier: usize,
    pub later: usize,
    pub magnitude: ViewCount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Hour, HourlyCount};
    use proptest::prelude::*;

    /// Day number `n` of June 2014
    fn day(n: u32) -> Day {
        Day::parse(&format!("201406{n:02}")).unwrap()
    }

    /// One hourly entry per daily total, at midnight of consecutive days
    fn hourly_series(totals: &[ViewCount]) -> Vec<HourlyCount> {
        (totals.iter().enumerate())
            .map(|(idx, &view_count)| HourlyCount {
                day: day(idx as u32 + 1),
                hour: 0,
                view_count,
            })
            .collect()
    }

    fn spike_of(totals: &[ViewCount]) -> (Day, Day, ViewCount) {
        let hourly = hourly_series(totals);
        let result = aggregate("enMain_Page", OrderedHours::new(&hourly).unwrap());
        assert_eq!(result.entity, "enMain_Page");
        (result.day1, result.day2, result.magnitude)
    }

    #[test]
    fn collapse_sums_hours_of_each_day() {
        let mut hourly = Vec::new();
        for (d, hours) in [(1u32, 24 as Hour), (2, 3), (4, 1)] {
            for hour in 0..hours {
                hourly.push(HourlyCount {
                    day: day(d),
                    hour,
                    view_count: u64::from(d) * 10 + u64::from(hour),
                });
            }
        }
        // Duplicate hours accumulate
        hourly.push(HourlyCount {
            day: day(4),
            hour: 0,
            view_count: 5,
        });
        let totals = DailyTotals::collapse(OrderedHours::new(&hourly).unwrap());
        assert_eq!(
            totals.as_slice(),
            [
                DailyTotal {
                    day: day(1),
                    total: 24 * 10 + (0..24).sum::<u64>(),
                },
                DailyTotal {
                    day: day(2),
                    total: 3 * 20 + 3,
                },
                DailyTotal {
                    day: day(4),
                    total: 40 + 5,
                },
            ]
        );
    }

    #[test]
    fn single_day_has_no_spike() {
        assert_eq!(spike_of(&[1000]), (day(1), day(1), 0));
    }

    #[test]
    fn increase_between_later_days() {
        assert_eq!(spike_of(&[10, 25, 40]), (day(2), day(3), 15));
    }

    #[test]
    fn first_day_never_starts_a_spike() {
        assert_eq!(spike_of(&[10, 25]), (day(1), day(1), 0));
        assert_eq!(
            spike_of(&[0, 100, 100, 100, 100, 100, 100]),
            (day(1), day(1), 0)
        );
    }

    #[test]
    fn reference_scenario() {
        assert_eq!(
            spike_of(&[100, 100, 50, 90, 200, 40]),
            (day(3), day(5), 150)
        );
    }

    #[test]
    fn decreasing_totals_have_no_spike() {
        assert_eq!(spike_of(&[100, 90, 80, 70]), (day(1), day(1), 0));
        assert_eq!(spike_of(&[7, 7, 7]), (day(1), day(1), 0));
    }

    #[test]
    fn decreases_are_not_spikes() {
        // A drop of 1000 views is ignored in favor of a rise of 1 view
        assert_eq!(spike_of(&[1000, 0, 1]), (day(2), day(3), 1));
    }

    #[test]
    fn window_reaches_four_days_back() {
        // At the sixth day, the second day is still in the window...
        assert_eq!(spike_of(&[5, 0, 9, 9, 9, 50]), (day(2), day(6), 50));
        // ...but at the seventh day, it isn't anymore
        assert_eq!(spike_of(&[5, 0, 9, 9, 9, 9, 50]), (day(6), day(7), 41));
    }

    #[test]
    fn ties_keep_the_first_spike() {
        // Same magnitude ending on different days: earliest end wins
        assert_eq!(spike_of(&[0, 5, 15, 5, 15]), (day(2), day(3), 10));
        // Same end day: the closest start wins
        assert_eq!(spike_of(&[0, 0, 0, 10]), (day(3), day(4), 10));
    }

    #[test]
    fn missing_days_are_not_filled() {
        // The window counts daily totals, not calendar days
        let hourly = [(1, 0), (3, 20), (10, 50)]
            .map(|(d, view_count)| HourlyCount {
                day: day(d),
                hour: 12,
                view_count,
            });
        let result = aggregate("frX", OrderedHours::new(&hourly).unwrap());
        assert_eq!((result.day1, result.day2, result.magnitude), (day(3), day(10), 30));
    }

    /// Straightforward restatement of the spike definition
    fn reference_spike(totals: &[ViewCount]) -> ViewCount {
        let mut best = 0;
        for later in 0..totals.len() {
            for back in 0..later.min(LOOKBACK_DAYS) {
                let earlier = later - back;
                if totals[later] > totals[earlier] {
                    best = best.max(totals[later] - totals[earlier]);
                }
            }
        }
        best
    }

    proptest! {
        #[test]
        fn hour_order_within_a_day_does_not_matter(
            totals in prop::collection::vec(0..1_000u64, 1..20),
            seed in any::<u64>(),
        ) {
            // Split each daily total over a few hours, in a scrambled order
            let mut hourly = Vec::new();
            for (idx, &total) in totals.iter().enumerate() {
                let mut hours = (0..4u8)
                    .map(|h| (h * 5 + (seed.rotate_left(idx as u32) as u8 % 5)) % 24)
                    .collect::<Vec<_>>();
                hours.rotate_left((seed as usize + idx) % 4);
                let shares = [total / 4, total / 4, total / 4, total - 3 * (total / 4)];
                for (hour, share) in hours.into_iter().zip(shares) {
                    hourly.push(HourlyCount { day: day(idx as u32 + 1), hour, view_count: share });
                }
            }
            let ordered = OrderedHours::sort(&mut hourly).unwrap();
            let collapsed = DailyTotals::collapse(ordered);
            prop_assert_eq!(
                collapsed.as_slice().iter().map(|t| t.total).collect::<Vec<_>>(),
                totals
            );
        }

        #[test]
        fn spike_matches_definition(totals in prop::collection::vec(0..1_000u64, 1..29)) {
            let (day1, day2, magnitude) = spike_of(&totals);
            prop_assert_eq!(magnitude, reference_spike(&totals));
            prop_assert!(day1 <= day2);
            if magnitude > 0 {
                let (d1, d2) = (day1.to_string(), day2.to_string());
                let idx1 = d1[6..].parse::<usize>().unwrap() - 1;
                let idx2 = d2[6..].parse::<usize>().unwrap() - 1;
                prop_assert!(idx1 >= 1 && idx1 < idx2 && idx2 - idx1 < LOOKBACK_DAYS);
                prop_assert_eq!(totals[idx2] - totals[idx1], magnitude);
            } else {
                prop_assert_eq!((day1, day2), (day(1), day(1)));
            }
        }

        #[test]
        fn aggregation_is_deterministic(totals in prop::collection::vec(any::<u32>(), 1..29)) {
            let totals = totals.into_iter().map(u64::from).collect::<Vec<_>>();
            prop_assert_eq!(spike_of(&totals), spike_of(&totals));
        }
    }
}
