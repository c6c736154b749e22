use super::numerics::*;
use super::parser::IrcMessage;

/// Helper to build IRC lines. All functions return formatted strings
/// ready to send (the session appends \r\n and any server-time tag).

const SERVER_NAME: &str = "whapp-irc";

pub fn server_name() -> &'static str {
    SERVER_NAME
}

/// :whapp-irc 001 nick :Welcome to whapp-irc, nick!
pub fn rpl_welcome(nick: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_WELCOME,
        vec![nick.into(), format!("Welcome to {}, {}!", SERVER_NAME, nick)],
    )
    .format()
}

/// :whapp-irc 002 nick :Your host is whapp-irc, running version x.y.z
pub fn rpl_yourhost(nick: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_YOURHOST,
        vec![
            nick.into(),
            format!(
                "Your host is {}, running version {}",
                SERVER_NAME,
                env!("CARGO_PKG_VERSION")
            ),
        ],
    )
    .format()
}

/// :whapp-irc 003 nick :This server was created ...
pub fn rpl_created(nick: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_CREATED,
        vec![nick.into(), "This server was created today".into()],
    )
    .format()
}

/// :whapp-irc 004 nick whapp-irc x.y.z o o
pub fn rpl_myinfo(nick: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_MYINFO,
        vec![
            nick.into(),
            SERVER_NAME.into(),
            env!("CARGO_PKG_VERSION").into(),
            "o".into(),
            "o".into(),
        ],
    )
    .format()
}

/// :whapp-irc 422 nick :MOTD File is missing
pub fn err_nomotd(nick: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        ERR_NOMOTD,
        vec![nick.into(), "MOTD File is missing".into()],
    )
    .format()
}

/// :nick JOIN #channel
pub fn join(nick: &str, channel: &str) -> String {
    IrcMessage::from_prefix(nick, "JOIN", vec![channel.into()]).format()
}

/// :nick PART #channel
pub fn part(nick: &str, channel: &str) -> String {
    IrcMessage::from_prefix(nick, "PART", vec![channel.into()]).format()
}

/// :author KICK #channel nick
pub fn kick(author: &str, channel: &str, nick: &str) -> String {
    IrcMessage::from_prefix(author, "KICK", vec![channel.into(), nick.into()]).format()
}

/// :from PRIVMSG target :message
pub fn privmsg(from: &str, target: &str, message: &str) -> String {
    IrcMessage::from_prefix(from, "PRIVMSG", vec![target.into(), message.into()]).format()
}

/// :whapp-irc 332 nick #channel :topic text
pub fn rpl_topic(nick: &str, channel: &str, topic: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_TOPIC,
        vec![nick.into(), channel.into(), topic.into()],
    )
    .format()
}

/// :whapp-irc 353 nick = #channel :nick1 @nick2 nick3
pub fn rpl_namreply(nick: &str, channel: &str, members: &[String]) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_NAMREPLY,
        vec![nick.into(), "=".into(), channel.into(), members.join(" ")],
    )
    .format()
}

/// :whapp-irc 366 nick #channel :End of /NAMES list
pub fn rpl_endofnames(nick: &str, channel: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        RPL_ENDOFNAMES,
        vec![nick.into(), channel.into(), "End of /NAMES list".into()],
    )
    .format()
}

/// :whapp-irc 401 nick target :No such nick/channel
pub fn err_nosuchnick(nick: &str, target: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        ERR_NOSUCHNICK,
        vec![nick.into(), target.into(), "No such nick/channel".into()],
    )
    .format()
}

/// :whapp-irc 461 nick COMMAND :Not enough parameters
pub fn err_needmoreparams(nick: &str, command: &str) -> String {
    IrcMessage::from_prefix(
        SERVER_NAME,
        ERR_NEEDMOREPARAMS,
        vec![nick.into(), command.into(), "Not enough parameters".into()],
    )
    .format()
}

/// :whapp-irc PONG whapp-irc :token
pub fn pong(token: &str) -> String {
    format!(":{} PONG {} :{}", SERVER_NAME, SERVER_NAME, token)
}

/// :whapp-irc CAP * SUBCOMMAND :cap1 cap2
///
/// The capability list is always sent as a trailing parameter, even when it
/// holds a single token or none at all.
pub fn cap(subcommand: &str, caps: &[String]) -> String {
    format!(":{} CAP * {} :{}", SERVER_NAME, subcommand, caps.join(" "))
}
