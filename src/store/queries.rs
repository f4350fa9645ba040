/// Auction columns in `AuctionRow` order
const AUCTION_COLUMNS: &str = "id, code, item_id, seller_id, start_price, current_price, min_increment, top_bidder_id, previous_bidder_id, previous_bid_amount, status, start_time, end_time, last_bid_time, bid_count, message_id, channel_id, created_at, updated_at";

/// Auction by id
pub fn get_auction() -> String {
    format!("SELECT {} FROM auctions WHERE id = $1", AUCTION_COLUMNS)
}

/// Auction by id, row locked
pub fn lock_auction() -> String {
    format!("SELECT {} FROM auctions WHERE id = $1 FOR UPDATE", AUCTION_COLUMNS)
}

/// Auction by code
pub fn get_auction_by_code() -> String {
    format!("SELECT {} FROM auctions WHERE code = $1", AUCTION_COLUMNS)
}

/// Active auctions
pub fn get_active_auctions() -> String {
    format!(
        "SELECT {} FROM auctions WHERE status = 'active' ORDER BY end_time ASC",
        AUCTION_COLUMNS
    )
}

/// Active auctions past end_time
pub fn get_expired_auctions() -> String {
    format!(
        "SELECT {} FROM auctions WHERE status = 'active' AND end_time <= $1 ORDER BY end_time ASC LIMIT $2",
        AUCTION_COLUMNS
    )
}

/// Recent completed auctions with a winner for one item
pub fn get_recent_completed_auctions() -> String {
    format!(
        "SELECT {} FROM auctions WHERE item_id = $1 AND status = 'completed' AND top_bidder_id IS NOT NULL ORDER BY end_time DESC LIMIT $2",
        AUCTION_COLUMNS
    )
}

/// New auction
pub fn insert_auction() -> String {
    format!(
        "INSERT INTO auctions (code, item_id, seller_id, start_price, current_price, min_increment, status, start_time, end_time, bid_count, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4, $5, 'active', $6, $7, 0, $8, $8)
         RETURNING {}",
        AUCTION_COLUMNS
    )
}

/// Auction code existence
pub const AUCTION_CODE_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM auctions WHERE code = $1)";

/// Accepted bid, end_time only moves forward
pub const APPLY_BID: &str = r#"
    UPDATE auctions
    SET top_bidder_id = $2,
        current_price = $3,
        previous_bidder_id = $4,
        previous_bid_amount = $5,
        last_bid_time = $6,
        end_time = GREATEST(end_time, $7),
        bid_count = bid_count + 1,
        updated_at = $6
    WHERE id = $1 AND status = 'active' AND current_price < $3
"#;

/// Terminal status transition, acts as compare-and-swap on the active status
pub const FINISH_AUCTION: &str =
    "UPDATE auctions SET status = $2, updated_at = $3 WHERE id = $1 AND status = 'active'";

/// Chat message references
pub const SET_AUCTION_MESSAGE: &str =
    "UPDATE auctions SET message_id = $2, channel_id = $3, updated_at = NOW() WHERE id = $1";

/// New bid
pub const INSERT_BID: &str = r#"
    INSERT INTO auction_bids (auction_id, bidder_id, amount, bid_time)
    VALUES ($1, $2, $3, $4)
    RETURNING id, auction_id, bidder_id, amount, bid_time
"#;

/// Bids of an auction
pub const GET_AUCTION_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, amount, bid_time
    FROM auction_bids
    WHERE auction_id = $1
    ORDER BY amount DESC
"#;

/// Bids of a bidder
pub const GET_BIDDER_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, amount, bid_time
    FROM auction_bids
    WHERE bidder_id = $1
    ORDER BY bid_time DESC
"#;

/// Item catalog entry
pub const GET_ITEM: &str = "SELECT id, name, category, tier FROM items WHERE id = $1";

/// Inventory amount
pub const GET_INVENTORY: &str =
    "SELECT amount FROM inventory WHERE owner_id = $1 AND item_id = $2";

/// Inventory amount, row locked
pub const LOCK_INVENTORY: &str =
    "SELECT amount FROM inventory WHERE owner_id = $1 AND item_id = $2 FOR UPDATE";

/// Inventory increment or insert
pub const UPSERT_INVENTORY: &str = r#"
    INSERT INTO inventory (owner_id, item_id, amount, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (owner_id, item_id)
    DO UPDATE SET amount = inventory.amount + EXCLUDED.amount, updated_at = NOW()
"#;

/// Inventory decrement
pub const DECREMENT_INVENTORY: &str = "UPDATE inventory SET amount = amount - $3, updated_at = NOW() WHERE owner_id = $1 AND item_id = $2 AND amount >= $3";

/// Inventory row removal
pub const DELETE_INVENTORY: &str = "DELETE FROM inventory WHERE owner_id = $1 AND item_id = $2";

/// Zero amount inventory cleanup
pub const CLEANUP_ZERO_INVENTORY: &str = "DELETE FROM inventory WHERE amount = 0";

/// Balance
pub const GET_BALANCE: &str = "SELECT balance FROM accounts WHERE owner_id = $1";

/// Balance, row locked
pub const LOCK_BALANCE: &str = "SELECT balance FROM accounts WHERE owner_id = $1 FOR UPDATE";

/// Balance change
pub const ADJUST_BALANCE: &str =
    "UPDATE accounts SET balance = balance + $2 WHERE owner_id = $1 AND balance + $2 >= 0";
