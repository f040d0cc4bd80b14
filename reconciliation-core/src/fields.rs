//! Closing input fields
//!
//! A closing form has a fixed set of scalar money fields plus three groups
//! of numbered slots (vault withdrawals, transport withdrawals and cash
//! received at the drawer). Fields are addressed with [`ClosingField`]; slot
//! numbers are bounded by [`Slot::new`], so every lookup is a `match` plus
//! an in-range array offset.

use crate::{types::Money, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of vault withdrawal slots
pub const VAULT_WITHDRAWAL_SLOTS: usize = 6;
/// Number of transport withdrawal slots
pub const TRANSPORT_WITHDRAWAL_SLOTS: usize = 3;
/// Number of "received at drawer" slots
pub const RECEIVED_SLOTS: usize = 6;

/// Group of numbered slots on the closing form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotGroup {
    /// Cash withdrawn from the drawer into the vault (sangria cofre)
    VaultWithdrawal,
    /// Cash withdrawn for transport (sangria transporte)
    TransportWithdrawal,
    /// Cash received at the drawer
    Received,
}

impl SlotGroup {
    /// All groups in form order
    pub const ALL: [SlotGroup; 3] = [
        SlotGroup::VaultWithdrawal,
        SlotGroup::TransportWithdrawal,
        SlotGroup::Received,
    ];

    /// Number of slots in this group
    pub const fn len(self) -> usize {
        match self {
            SlotGroup::VaultWithdrawal => VAULT_WITHDRAWAL_SLOTS,
            SlotGroup::TransportWithdrawal => TRANSPORT_WITHDRAWAL_SLOTS,
            SlotGroup::Received => RECEIVED_SLOTS,
        }
    }

    /// Label prefix
    pub const fn name(self) -> &'static str {
        match self {
            SlotGroup::VaultWithdrawal => "vault_withdrawal",
            SlotGroup::TransportWithdrawal => "transport_withdrawal",
            SlotGroup::Received => "received",
        }
    }
}

/// A numbered slot inside a [`SlotGroup`]; always in range once constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    group: SlotGroup,
    number: u8,
}

impl Slot {
    /// Create a slot (1-based number)
    pub fn new(group: SlotGroup, number: u8) -> Result<Self> {
        if number == 0 || usize::from(number) > group.len() {
            return Err(Error::InvalidSlot {
                group: group.name(),
                index: number,
                len: group.len(),
            });
        }
        Ok(Self { group, number })
    }

    /// Slot group
    pub fn group(&self) -> SlotGroup {
        self.group
    }

    /// 1-based slot number
    pub fn number(&self) -> u8 {
        self.number
    }

    fn offset(&self) -> usize {
        usize::from(self.number) - 1
    }

    /// Every slot of a group, in order
    pub fn all_in(group: SlotGroup) -> impl Iterator<Item = Slot> {
        (1..=group.len()).map(move |n| Slot {
            group,
            number: n as u8,
        })
    }
}

/// One addressable field of the closing form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClosingField {
    /// Opening coin balance
    InitialCoin,
    /// Opening pool-game (bolão) float
    InitialPoolFloat,
    /// Opening vault supply float
    InitialSupplyFloat,
    /// Commission earned
    Commission,
    /// Product (ticket) sales
    ProductSales,
    /// Prizes paid out at the counter
    PrizesPaid,
    /// First cash-drawer total
    CashDrawer1,
    /// Second cash-drawer total
    CashDrawer2,
    /// Numbered withdrawal or received slot
    Slot(Slot),
    /// Counted closing coin balance
    FinalCoin,
    /// Counted closing pool-game float
    FinalPoolFloat,
    /// Counted closing vault supply float
    FinalSupplyFloat,
}

impl ClosingField {
    /// Every field in form order
    pub fn all() -> Vec<ClosingField> {
        let mut fields = vec![
            ClosingField::InitialCoin,
            ClosingField::InitialPoolFloat,
            ClosingField::InitialSupplyFloat,
            ClosingField::Commission,
            ClosingField::ProductSales,
            ClosingField::PrizesPaid,
            ClosingField::CashDrawer1,
            ClosingField::CashDrawer2,
        ];
        for group in SlotGroup::ALL {
            fields.extend(Slot::all_in(group).map(ClosingField::Slot));
        }
        fields.extend([
            ClosingField::FinalCoin,
            ClosingField::FinalPoolFloat,
            ClosingField::FinalSupplyFloat,
        ]);
        fields
    }

    /// Stable label used in validation messages
    pub fn label(&self) -> String {
        match self {
            ClosingField::InitialCoin => "initial_coin".to_string(),
            ClosingField::InitialPoolFloat => "initial_pool_float".to_string(),
            ClosingField::InitialSupplyFloat => "initial_supply_float".to_string(),
            ClosingField::Commission => "commission".to_string(),
            ClosingField::ProductSales => "product_sales".to_string(),
            ClosingField::PrizesPaid => "prizes_paid".to_string(),
            ClosingField::CashDrawer1 => "cash_drawer_1".to_string(),
            ClosingField::CashDrawer2 => "cash_drawer_2".to_string(),
            ClosingField::Slot(slot) => format!("{}_{}", slot.group().name(), slot.number()),
            ClosingField::FinalCoin => "final_coin".to_string(),
            ClosingField::FinalPoolFloat => "final_pool_float".to_string(),
            ClosingField::FinalSupplyFloat => "final_supply_float".to_string(),
        }
    }
}

impl fmt::Display for ClosingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Raw money inputs of a closing; absent fields deserialize as zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosingFields {
    /// Opening coin balance
    pub initial_coin: Money,
    /// Opening pool-game float
    pub initial_pool_float: Money,
    /// Opening vault supply float
    pub initial_supply_float: Money,
    /// Commission earned
    pub commission: Money,
    /// Product sales
    pub product_sales: Money,
    /// Prizes paid out
    pub prizes_paid: Money,
    /// First cash-drawer total
    pub cash_drawer_1: Money,
    /// Second cash-drawer total
    pub cash_drawer_2: Money,
    /// Vault withdrawal slots 1..=6
    pub vault_withdrawals: [Money; VAULT_WITHDRAWAL_SLOTS],
    /// Transport withdrawal slots 1..=3
    pub transport_withdrawals: [Money; TRANSPORT_WITHDRAWAL_SLOTS],
    /// Received-at-drawer slots 1..=6
    pub received: [Money; RECEIVED_SLOTS],
    /// Counted closing coin balance
    pub final_coin: Money,
    /// Counted closing pool-game float
    pub final_pool_float: Money,
    /// Counted closing vault supply float
    pub final_supply_float: Money,
}

impl ClosingFields {
    /// Read one field
    pub fn get(&self, field: ClosingField) -> Money {
        match field {
            ClosingField::InitialCoin => self.initial_coin,
            ClosingField::InitialPoolFloat => self.initial_pool_float,
            ClosingField::InitialSupplyFloat => self.initial_supply_float,
            ClosingField::Commission => self.commission,
            ClosingField::ProductSales => self.product_sales,
            ClosingField::PrizesPaid => self.prizes_paid,
            ClosingField::CashDrawer1 => self.cash_drawer_1,
            ClosingField::CashDrawer2 => self.cash_drawer_2,
            ClosingField::Slot(slot) => self.slots(slot.group())[slot.offset()],
            ClosingField::FinalCoin => self.final_coin,
            ClosingField::FinalPoolFloat => self.final_pool_float,
            ClosingField::FinalSupplyFloat => self.final_supply_float,
        }
    }

    /// Write one field
    pub fn set(&mut self, field: ClosingField, value: Money) {
        let target = match field {
            ClosingField::InitialCoin => &mut self.initial_coin,
            ClosingField::InitialPoolFloat => &mut self.initial_pool_float,
            ClosingField::InitialSupplyFloat => &mut self.initial_supply_float,
            ClosingField::Commission => &mut self.commission,
            ClosingField::ProductSales => &mut self.product_sales,
            ClosingField::PrizesPaid => &mut self.prizes_paid,
            ClosingField::CashDrawer1 => &mut self.cash_drawer_1,
            ClosingField::CashDrawer2 => &mut self.cash_drawer_2,
            ClosingField::Slot(slot) => &mut self.slots_mut(slot.group())[slot.offset()],
            ClosingField::FinalCoin => &mut self.final_coin,
            ClosingField::FinalPoolFloat => &mut self.final_pool_float,
            ClosingField::FinalSupplyFloat => &mut self.final_supply_float,
        };
        *target = value;
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, field: ClosingField, value: Money) -> Self {
        self.set(field, value);
        self
    }

    /// Slots of one group
    pub fn slots(&self, group: SlotGroup) -> &[Money] {
        match group {
            SlotGroup::VaultWithdrawal => &self.vault_withdrawals,
            SlotGroup::TransportWithdrawal => &self.transport_withdrawals,
            SlotGroup::Received => &self.received,
        }
    }

    fn slots_mut(&mut self, group: SlotGroup) -> &mut [Money] {
        match group {
            SlotGroup::VaultWithdrawal => &mut self.vault_withdrawals,
            SlotGroup::TransportWithdrawal => &mut self.transport_withdrawals,
            SlotGroup::Received => &mut self.received,
        }
    }

    /// Every field with its value, in form order
    pub fn entries(&self) -> impl Iterator<Item = (ClosingField, Money)> + '_ {
        ClosingField::all()
            .into_iter()
            .map(move |field| (field, self.get(field)))
    }
}
