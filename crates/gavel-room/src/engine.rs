//! The auction rules: phase transitions, escrow, and settlement.
//!
//! Every operation here is a synchronous mutation of [`GameState`] that
//! either succeeds atomically or returns a [`RoomError`] leaving the
//! state untouched. The room task applies these and turns the outcomes
//! into broadcasts; nothing in this module knows about connections or
//! timers.
//!
//! Money invariant: a player's budget is debited the moment their bid
//! becomes the high bid (escrow) and credited back the moment they are
//! outbid or the lot is abandoned. At any instant,
//! `sum(budgets) + sum(won final_bids) + current escrow` equals the sum
//! of all starting budgets handed out.

use gavel_protocol::{AuctionPhase, Item, ItemId, ItemSpec, ItemStatus, PlayerId, Settings, WonItem};

use crate::error::RoomError;
use crate::state::{clip_name, GameState};

/// Result of an accepted bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidOutcome {
    pub amount: u64,
    /// The player who was outbid and the escrow returned to them.
    /// `None` on a first bid or when a bidder raises their own bid.
    pub outbid: Option<(PlayerId, u64)>,
}

/// Result of settling the current lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// The lot after settlement: `Sold` on a sale, back to `Pending`
    /// when there were no bids.
    pub item: Item,
    pub winner: Option<(PlayerId, u64)>,
}

/// Result of abandoning the current lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    /// The cleared lot, or `None` when no auction was in progress.
    pub item: Option<Item>,
    pub refunded: Option<(PlayerId, u64)>,
}

impl GameState {
    /// Appends one item to the inventory as `Pending`.
    pub fn add_item(&mut self, name: &str, base_price: u64) -> Result<Item, RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidValue("item name cannot be empty".into()));
        }
        let item = Item {
            id: ItemId(self.next_item_id),
            name: name.to_string(),
            base_price,
            status: ItemStatus::Pending,
        };
        self.next_item_id += 1;
        self.items.push(item.clone());
        Ok(item)
    }

    /// Appends a batch of items, silently skipping blank names.
    pub fn add_items(&mut self, specs: &[ItemSpec]) -> Vec<Item> {
        specs
            .iter()
            .filter_map(|spec| self.add_item(&spec.name, spec.base_price).ok())
            .collect()
    }

    /// Puts a pending item on the block. The base price becomes the
    /// standing high bid with no bidder attached.
    pub fn select_item(&mut self, item_id: ItemId) -> Result<Item, RoomError> {
        if self.phase.has_lot() {
            return Err(RoomError::WrongPhase {
                operation: "select an item",
                phase: self.phase,
            });
        }
        let item = self
            .item_mut(item_id)
            .ok_or(RoomError::UnknownItem(item_id))?;
        if item.status != ItemStatus::Pending {
            return Err(RoomError::ItemUnavailable {
                item: item_id,
                status: item.status,
            });
        }
        item.status = ItemStatus::Auctioning;
        let item = item.clone();
        self.current_lot = Some(item_id);
        self.current_highest_bid = item.base_price;
        self.current_highest_bidder = None;
        self.phase = AuctionPhase::ItemSelected;
        Ok(item)
    }

    /// Opens bidding on the selected lot. The caller arms the timer.
    pub fn start_bidding(&mut self) -> Result<(), RoomError> {
        if self.phase != AuctionPhase::ItemSelected {
            return Err(RoomError::WrongPhase {
                operation: "start bidding",
                phase: self.phase,
            });
        }
        self.phase = AuctionPhase::Bidding;
        Ok(())
    }

    /// The smallest acceptable next bid: the standing high bid plus the
    /// configured percentage increment, rounded up.
    ///
    /// Both inputs are client-supplied, so the arithmetic runs in `u128`
    /// and saturates at `u64::MAX` rather than overflowing.
    pub fn min_allowed_bid(&self) -> u64 {
        let high = u128::from(self.current_highest_bid);
        let pct = u128::from(self.settings.min_increment_percent);
        let min = (high * (100 + pct) + 99) / 100;
        u64::try_from(min).unwrap_or(u64::MAX)
    }

    /// Places a bid on the current lot.
    ///
    /// On success the previous high bidder's escrow is credited back and
    /// `amount` is debited from the caller. A bidder raising their own
    /// bid only pays the difference in effect: their prior escrow is
    /// returned before the new amount is taken.
    pub fn place_bid(&mut self, bidder: &PlayerId, amount: u64) -> Result<BidOutcome, RoomError> {
        if self.phase != AuctionPhase::Bidding {
            return Err(RoomError::WrongPhase {
                operation: "bid",
                phase: self.phase,
            });
        }
        let min_allowed = self.min_allowed_bid();
        if amount < min_allowed {
            return Err(RoomError::BidTooLow { amount, min_allowed });
        }
        let prev = self
            .current_highest_bidder
            .clone()
            .map(|p| (p, self.current_highest_bid));
        // Escrow the caller already holds counts toward the new bid.
        let held = match &prev {
            Some((p, held)) if p == bidder => *held,
            _ => 0,
        };
        let budget = self
            .players
            .get(bidder)
            .ok_or_else(|| RoomError::UnknownPlayer(bidder.clone()))?
            .budget;
        if amount > budget + held {
            return Err(RoomError::InsufficientBudget {
                amount,
                budget: budget + held,
            });
        }
        if let Some((prev_id, refund)) = &prev {
            if let Some(player) = self.players.get_mut(prev_id) {
                player.budget += refund;
            }
        }
        if let Some(player) = self.players.get_mut(bidder) {
            player.budget -= amount;
        }
        self.current_highest_bid = amount;
        self.current_highest_bidder = Some(bidder.clone());
        Ok(BidOutcome {
            amount,
            outbid: prev.filter(|(p, _)| p != bidder),
        })
    }

    /// Settles the current lot. Valid only while bidding is open.
    ///
    /// With a standing bidder the lot is marked `Sold` and moves into
    /// their won pile at the high bid; the escrow already debited becomes
    /// the payment. With no bids the lot returns to `Pending`.
    pub fn finalize(&mut self) -> Result<SettlementOutcome, RoomError> {
        let lot_id = match (self.phase, self.current_lot) {
            (AuctionPhase::Bidding, Some(id)) => id,
            _ => {
                return Err(RoomError::WrongPhase {
                    operation: "finalize",
                    phase: self.phase,
                });
            }
        };
        let winner = self.current_highest_bidder.clone();
        let final_bid = self.current_highest_bid;
        let status = if winner.is_some() {
            ItemStatus::Sold
        } else {
            ItemStatus::Pending
        };
        let item = {
            // Lot id always resolves while a lot is on the block.
            let item = self
                .item_mut(lot_id)
                .ok_or(RoomError::UnknownItem(lot_id))?;
            item.status = status;
            item.clone()
        };
        if let Some(winner_id) = &winner {
            if let Some(player) = self.players.get_mut(winner_id) {
                player.won_items.push(WonItem {
                    item: item.clone(),
                    final_bid,
                });
            }
        }
        self.reset_lot();
        Ok(SettlementOutcome {
            item,
            winner: winner.map(|p| (p, final_bid)),
        })
    }

    /// Abandons the current lot without a sale, refunding any standing
    /// escrow. A no-op when no auction is in progress.
    pub fn clear_auction(&mut self) -> ClearOutcome {
        let Some(lot_id) = self.current_lot else {
            return ClearOutcome {
                item: None,
                refunded: None,
            };
        };
        let refunded = self.current_highest_bidder.clone().map(|p| {
            let amount = self.current_highest_bid;
            if let Some(player) = self.players.get_mut(&p) {
                player.budget += amount;
            }
            (p, amount)
        });
        let item = self.item_mut(lot_id).map(|item| {
            item.status = ItemStatus::Pending;
            item.clone()
        });
        self.reset_lot();
        ClearOutcome { item, refunded }
    }

    /// Withdraws a player's standing high bid, as when they disconnect
    /// mid-round. Their escrow is returned and the lot reverts to its
    /// base price with no bidder. Returns `true` when a bid was retracted.
    pub fn retract_bidder(&mut self, player: &PlayerId) -> bool {
        if self.current_highest_bidder.as_ref() != Some(player) {
            return false;
        }
        let refund = self.current_highest_bid;
        if let Some(p) = self.players.get_mut(player) {
            p.budget += refund;
        }
        self.current_highest_bidder = None;
        self.current_highest_bid = self.lot().map(|i| i.base_price).unwrap_or(0);
        true
    }

    /// Replaces the room settings. Existing budgets are untouched; the
    /// new starting budget applies to future joins and the new duration
    /// the next time the timer is armed.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), RoomError> {
        if settings.round_duration_secs == 0 {
            return Err(RoomError::InvalidValue(
                "round duration must be at least 1 second".into(),
            ));
        }
        self.settings = settings;
        Ok(())
    }

    /// Changes a player's display name, returning the clipped name.
    pub fn rename_player(&mut self, id: &PlayerId, name: &str) -> Result<String, RoomError> {
        let name = clip_name(name)
            .ok_or_else(|| RoomError::InvalidValue("name cannot be empty".into()))?;
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| RoomError::UnknownPlayer(id.clone()))?;
        player.name = name.clone();
        Ok(name)
    }

    fn reset_lot(&mut self) {
        self.current_lot = None;
        self.current_highest_bid = 0;
        self.current_highest_bidder = None;
        self.phase = AuctionPhase::Idle;
    }
}

// =========================================================================
// Tests
// =========================================================================
