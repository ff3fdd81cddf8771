use crate::db::models::PollOption;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OptionTally {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
    pub percentage: i64,
}

/// Tally a poll's options for display: sorted by votes descending, ties
/// broken by option position so the order is stable, with integer
/// percentages of the given total. A zero total yields all-zero
/// percentages rather than dividing.
pub fn tally(options: &[PollOption], total_votes: i64) -> Vec<OptionTally> {
    let mut sorted: Vec<&PollOption> = options.iter().collect();
    sorted.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.position.cmp(&b.position)));

    sorted
        .into_iter()
        .map(|opt| OptionTally {
            id: opt.id,
            text: opt.option_text.clone(),
            votes: opt.votes,
            percentage: percentage(opt.votes, total_votes),
        })
        .collect()
}

/// Integer percent, rounded half-up. Rounded values may not sum to 100.
pub fn percentage(votes: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (votes * 200 + total) / (2 * total)
}

/// The option with the most votes, or None when nothing has been cast
/// yet. Ties go to the earlier option, consistent with `tally` order.
pub fn leader(tallies: &[OptionTally]) -> Option<Uuid> {
    match tallies.first() {
        Some(first) if first.votes > 0 => Some(first.id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, position: i32, votes: i64) -> PollOption {
        PollOption {
            id: Uuid::new_v4(),
            poll_id: Uuid::nil(),
            option_text: text.to_string(),
            position,
            votes,
        }
    }

    #[test]
    fn three_to_one_is_seventy_five_twenty_five() {
        let options = vec![option("yes", 0, 3), option("no", 1, 1)];
        let tallies = tally(&options, 4);

        assert_eq!(tallies[0].text, "yes");
        assert_eq!(tallies[0].percentage, 75);
        assert_eq!(tallies[1].text, "no");
        assert_eq!(tallies[1].percentage, 25);
    }

    #[test]
    fn sorted_by_votes_descending() {
        let options = vec![
            option("a", 0, 2),
            option("b", 1, 7),
            option("c", 2, 4),
        ];
        let tallies = tally(&options, 13);
        let order: Vec<&str> = tallies.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[test]
    fn ties_break_by_position() {
        let options = vec![option("later", 1, 5), option("earlier", 0, 5)];
        let tallies = tally(&options, 10);
        assert_eq!(tallies[0].text, "earlier");
        assert_eq!(tallies[1].text, "later");
    }

    #[test]
    fn zero_total_gives_zero_percentages() {
        let options = vec![option("a", 0, 0), option("b", 1, 0)];
        let tallies = tally(&options, 0);
        assert!(tallies.iter().all(|t| t.percentage == 0));
        assert_eq!(leader(&tallies), None);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13); // 12.5 rounds up
        assert_eq!(percentage(0, 5), 0);
        assert_eq!(percentage(5, 5), 100);
    }

    #[test]
    fn leader_is_top_option() {
        let options = vec![option("a", 0, 1), option("b", 1, 6)];
        let tallies = tally(&options, 7);
        assert_eq!(leader(&tallies), Some(tallies[0].id));
        assert_eq!(tallies[0].text, "b");
    }
}
