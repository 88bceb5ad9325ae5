//! Salary cap and minimum-roster budget rules applied before a bid reaches
//! the auction engine.

use crate::error::ValidationError;
use crate::models::bidding::CommittedBids;
use crate::services::persistence_gateway::RosterPlayer;

/// Minimum contract a roster spot can be filled with
pub const MIN_SALARY: i64 = 500_000;
pub const MIN_FORWARDS: usize = 9;
pub const MIN_DEFENSE: usize = 6;
pub const MIN_GOALIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionGroup {
    Forward,
    Defense,
    Goalie,
    Other,
}

impl PositionGroup {
    pub fn of(position: &str) -> Self {
        match position {
            "C" | "LW" | "RW" => PositionGroup::Forward,
            "LD" | "RD" => PositionGroup::Defense,
            "G" => PositionGroup::Goalie,
            _ => PositionGroup::Other,
        }
    }
}

pub fn current_salary(roster: &[RosterPlayer]) -> i64 {
    roster.iter().map(|p| p.contract_amount).sum()
}

/// Everything needed to judge whether a team can afford a bid
#[derive(Debug)]
pub struct BudgetCheck<'a> {
    pub salary_cap: i64,
    pub roster: &'a [RosterPlayer],
    pub committed: &'a CommittedBids,
    pub player_id: &'a str,
    pub position: &'a str,
    pub amount: i64,
}

impl BudgetCheck<'_> {
    /// Cap usage if the bid wins: roster + other committed bids + this bid.
    /// A bid the team already leads on this player is replaced, not added.
    pub fn proposed_total(&self) -> i64 {
        let existing = self
            .committed
            .active_bids
            .iter()
            .find(|bid| bid.player_season_id == self.player_id)
            .map(|bid| bid.amount)
            .unwrap_or(0);

        current_salary(self.roster) + self.committed.total_committed + self.amount - existing
    }

    /// Roster spots still open per group once this player (and every
    /// player the team leads on) has joined.
    fn missing_spots(&self) -> (usize, usize, usize) {
        let mut forwards = 0;
        let mut defense = 0;
        let mut goalies = 0;

        let positions = self
            .roster
            .iter()
            .map(|p| p.position.as_str())
            .chain(
                self.committed
                    .active_bids
                    .iter()
                    .filter(|bid| bid.player_season_id != self.player_id)
                    .map(|bid| bid.position.as_str()),
            )
            .chain(std::iter::once(self.position));

        for position in positions {
            match PositionGroup::of(position) {
                PositionGroup::Forward => forwards += 1,
                PositionGroup::Defense => defense += 1,
                PositionGroup::Goalie => goalies += 1,
                PositionGroup::Other => {}
            }
        }

        (
            MIN_FORWARDS.saturating_sub(forwards),
            MIN_DEFENSE.saturating_sub(defense),
            MIN_GOALIES.saturating_sub(goalies),
        )
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        let proposed = self.proposed_total();
        if proposed > self.salary_cap {
            return Err(ValidationError::OverSalaryCap {
                salary_cap: self.salary_cap,
            });
        }

        let (forwards, defense, goalies) = self.missing_spots();
        let minimum_budget = (forwards + defense + goalies) as i64 * MIN_SALARY;
        if self.salary_cap - proposed < minimum_budget {
            let missing = [(forwards, "forwards"), (defense, "defense"), (goalies, "goalies")]
                .iter()
                .filter(|(count, _)| *count > 0)
                .map(|(count, label)| format!("{} {}", count, label))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ValidationError::InsufficientRosterBudget {
                missing,
                minimum_budget,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bidding::CommittedBid;

    fn player(position: &str, amount: i64) -> RosterPlayer {
        RosterPlayer {
            id: format!("ps-{}-{}", position, amount),
            name: "Rostered".to_string(),
            position: position.to_string(),
            gamertag: "tag".to_string(),
            contract_amount: amount,
        }
    }

    fn full_roster() -> Vec<RosterPlayer> {
        let mut roster = Vec::new();
        roster.extend((0..9).map(|_| player("C", 1_000_000)));
        roster.extend((0..6).map(|_| player("LD", 1_000_000)));
        roster.extend((0..2).map(|_| player("G", 1_000_000)));
        roster
    }

    #[test]
    fn test_position_groups() {
        assert_eq!(PositionGroup::of("LW"), PositionGroup::Forward);
        assert_eq!(PositionGroup::of("RD"), PositionGroup::Defense);
        assert_eq!(PositionGroup::of("G"), PositionGroup::Goalie);
        assert_eq!(PositionGroup::of("X"), PositionGroup::Other);
    }

    #[test]
    fn test_over_cap_rejected() {
        let roster = full_roster(); // 17M
        let committed = CommittedBids::default();
        let check = BudgetCheck {
            salary_cap: 18_000_000,
            roster: &roster,
            committed: &committed,
            player_id: "ps-new",
            position: "C",
            amount: 1_250_000,
        };
        assert_eq!(
            check.check(),
            Err(ValidationError::OverSalaryCap {
                salary_cap: 18_000_000
            })
        );
    }

    #[test]
    fn test_raising_own_bid_replaces_it() {
        let roster = full_roster();
        let committed = CommittedBids {
            total_committed: 750_000,
            active_bids: vec![CommittedBid {
                player_season_id: "ps-new".to_string(),
                player_name: "Target".to_string(),
                position: "C".to_string(),
                amount: 750_000,
                deadline: Some(1),
            }],
        };
        let check = BudgetCheck {
            salary_cap: 18_000_000,
            roster: &roster,
            committed: &committed,
            player_id: "ps-new",
            position: "C",
            amount: 1_000_000,
        };
        assert_eq!(check.proposed_total(), 18_000_000);
        assert!(check.check().is_ok());
    }

    #[test]
    fn test_missing_roster_spots_need_budget() {
        // Empty roster: bidding on a goalie leaves 9 F, 6 D, 1 G to fill
        let roster = Vec::new();
        let committed = CommittedBids::default();
        let check = BudgetCheck {
            salary_cap: 10_000_000,
            roster: &roster,
            committed: &committed,
            player_id: "ps-g",
            position: "G",
            amount: 3_000_000,
        };
        match check.check() {
            Err(ValidationError::InsufficientRosterBudget {
                missing,
                minimum_budget,
            }) => {
                assert_eq!(missing, "9 forwards, 6 defense, 1 goalies");
                assert_eq!(minimum_budget, 16 * MIN_SALARY);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_affordable_bid_passes() {
        let roster = Vec::new();
        let committed = CommittedBids::default();
        let check = BudgetCheck {
            salary_cap: 20_000_000,
            roster: &roster,
            committed: &committed,
            player_id: "ps-g",
            position: "G",
            amount: 1_000_000,
        };
        assert!(check.check().is_ok());
    }
}
