/// IRC numeric reply codes per RFC 2812.

// Connection registration
pub const RPL_WELCOME: &str = "001";
pub const RPL_YOURHOST: &str = "002";
pub const RPL_CREATED: &str = "003";
pub const RPL_MYINFO: &str = "004";

// Channel state sent on join
pub const RPL_TOPIC: &str = "332";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";

// MOTD
pub const ERR_NOMOTD: &str = "422";

// Errors
pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NEEDMOREPARAMS: &str = "461";
