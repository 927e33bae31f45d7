// src/commands.rs
//
// Operator command surface: parsing of console lines and the pure
// state-mutation step. Persistence of the result is the engine's job.
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::state::BotState;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetCoin(String),
    SetDecrease(Decimal),
    SetIncrease(Decimal),
    SetAmount(Decimal),
    SetBudget(Decimal),
    Start,
    Stop,
    Status,
    Reset,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'; try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0} must be a fraction in (0, 1), e.g. 0.02 for 2%")]
    InvalidPercent(&'static str),

    #[error("{0} must be positive")]
    InvalidAmount(&'static str),

    #[error("cannot change symbol while a position is open for {0}; sell or reset first")]
    PositionOpen(String),

    #[error("failed to persist state: {0}; monitoring halted")]
    Persistence(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub text: String,
    /// True when the command changed state and the result must be persisted
    /// before acknowledging.
    pub mutated: bool,
}

fn mutated(text: String) -> CommandReply {
    CommandReply {
        text,
        mutated: true,
    }
}

fn unchanged(text: String) -> CommandReply {
    CommandReply {
        text,
        mutated: false,
    }
}

pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let mut parts = line.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| CommandError::Unknown(String::new()))?;

    let command = match name {
        "setcoin" => Command::SetCoin(arg(&mut parts, "setcoin <SYMBOL>")?.to_string()),
        "set_decrease" => Command::SetDecrease(decimal_arg(&mut parts, "set_decrease <fraction>")?),
        "set_increase" => Command::SetIncrease(decimal_arg(&mut parts, "set_increase <fraction>")?),
        "set_amount" => Command::SetAmount(decimal_arg(&mut parts, "set_amount <amount>")?),
        "set_budget" => Command::SetBudget(decimal_arg(&mut parts, "set_budget <amount>")?),
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "reset" => Command::Reset,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    usage: &'static str,
) -> Result<&'a str, CommandError> {
    parts.next().ok_or(CommandError::Usage(usage))
}

fn decimal_arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    usage: &'static str,
) -> Result<Decimal, CommandError> {
    let raw = arg(parts, usage)?;
    Decimal::from_str(raw).map_err(|_| CommandError::Usage(usage))
}

fn ensure_fraction(value: Decimal, what: &'static str) -> Result<(), CommandError> {
    if value <= Decimal::ZERO || value >= Decimal::ONE {
        return Err(CommandError::InvalidPercent(what));
    }
    Ok(())
}

fn ensure_positive(value: Decimal, what: &'static str) -> Result<(), CommandError> {
    if value <= Decimal::ZERO {
        return Err(CommandError::InvalidAmount(what));
    }
    Ok(())
}

/// Applies one command to the state. Rejections leave the state untouched.
pub fn apply_command(state: &mut BotState, command: &Command) -> Result<CommandReply, CommandError> {
    match command {
        Command::SetCoin(raw) => {
            if let Some(pos) = &state.position {
                return Err(CommandError::PositionOpen(pos.symbol.clone()));
            }
            let symbol = raw.to_uppercase();
            state.params.symbol = symbol.clone();
            // A baseline carried over from another instrument is meaningless.
            state.reference_price = None;
            Ok(mutated(format!("Symbol set to {symbol}")))
        }
        Command::SetDecrease(pct) => {
            ensure_fraction(*pct, "decrease percent")?;
            state.params.decrease_pct = *pct;
            Ok(mutated(format!(
                "Decrease/trailing percent set to {:.2}%",
                *pct * Decimal::ONE_HUNDRED
            )))
        }
        Command::SetIncrease(pct) => {
            ensure_fraction(*pct, "increase percent")?;
            state.params.increase_pct = *pct;
            Ok(mutated(format!(
                "Profit target percent set to {:.2}%",
                *pct * Decimal::ONE_HUNDRED
            )))
        }
        Command::SetAmount(amount) => {
            ensure_positive(*amount, "trade amount")?;
            state.params.trade_amount = *amount;
            Ok(mutated(format!("Trade amount set to {amount}")))
        }
        Command::SetBudget(amount) => {
            ensure_positive(*amount, "budget")?;
            state.params.allocated_budget = *amount;
            state.ledger.reset(*amount);
            Ok(mutated(format!("Allocated budget set to {amount}")))
        }
        Command::Start => {
            if state.running {
                Ok(unchanged("Bot is already running".to_string()))
            } else {
                state.running = true;
                Ok(mutated("Monitoring started".to_string()))
            }
        }
        Command::Stop => {
            if !state.running {
                Ok(unchanged("Bot is not running".to_string()))
            } else {
                state.running = false;
                Ok(mutated("Monitoring stopped".to_string()))
            }
        }
        Command::Status => Ok(unchanged(status_text(state))),
        Command::Reset => {
            let had_position = state.position.is_some();
            *state = BotState::default();
            let text = if had_position {
                "State reset to defaults (an open position record was discarded)".to_string()
            } else {
                "State reset to defaults".to_string()
            };
            Ok(mutated(text))
        }
    }
}

fn status_text(state: &BotState) -> String {
    let p = &state.params;
    let position = match &state.position {
        Some(pos) => format!(
            "{} qty {} @ {} (high {}, since {})",
            pos.symbol,
            pos.quantity,
            pos.buy_price,
            pos.highest_price,
            pos.entry_time.to_rfc3339()
        ),
        None => "none".to_string(),
    };
    let reference = state
        .reference_price
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unset".to_string());
    format!(
        "Symbol: {}\n\
         Decrease (buy trigger / trailing): {:.2}%\n\
         Increase (profit target): {:.2}%\n\
         Trade amount: {}\n\
         Allocated budget: {}\n\
         Remaining budget: {}\n\
         Position: {}\n\
         Reference price: {}\n\
         Running: {}",
        p.symbol,
        p.decrease_pct * Decimal::ONE_HUNDRED,
        p.increase_pct * Decimal::ONE_HUNDRED,
        p.trade_amount,
        p.allocated_budget,
        state.ledger.remaining(),
        position,
        reference,
        state.running,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Position;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn open_position(state: &mut BotState) {
        state.position = Some(Position {
            symbol: state.params.symbol.clone(),
            quantity: dec!(1),
            buy_price: dec!(100),
            highest_price: dec!(100),
            entry_time: chrono::Utc::now(),
        });
    }

    #[test]
    fn parses_the_full_command_set() {
        assert_eq!(
            parse_line("setcoin ethusdt").unwrap(),
            Command::SetCoin("ethusdt".to_string())
        );
        assert_eq!(
            parse_line("set_decrease 0.05").unwrap(),
            Command::SetDecrease(dec!(0.05))
        );
        assert_eq!(
            parse_line("set_increase 0.1").unwrap(),
            Command::SetIncrease(dec!(0.1))
        );
        assert_eq!(
            parse_line("set_amount 25").unwrap(),
            Command::SetAmount(dec!(25))
        );
        assert_eq!(
            parse_line("set_budget 1000").unwrap(),
            Command::SetBudget(dec!(1000))
        );
        assert_eq!(parse_line("start").unwrap(), Command::Start);
        assert_eq!(parse_line("stop").unwrap(), Command::Stop);
        assert_eq!(parse_line("status").unwrap(), Command::Status);
        assert_eq!(parse_line("reset").unwrap(), Command::Reset);
    }

    #[test]
    fn rejects_unknown_and_malformed_lines() {
        assert!(matches!(
            parse_line("buy everything"),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(
            parse_line("set_decrease"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            parse_line("set_amount lots"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn percent_setters_reject_values_outside_unit_interval() {
        let mut state = BotState::default();
        for bad in [dec!(0), dec!(1), dec!(1.5), dec!(-0.1)] {
            let err = apply_command(&mut state, &Command::SetDecrease(bad)).unwrap_err();
            assert!(matches!(err, CommandError::InvalidPercent(_)));
            let err = apply_command(&mut state, &Command::SetIncrease(bad)).unwrap_err();
            assert!(matches!(err, CommandError::InvalidPercent(_)));
        }
        assert_eq!(state, BotState::default());
    }

    #[test]
    fn amount_setters_reject_non_positive_values() {
        let mut state = BotState::default();
        for bad in [dec!(0), dec!(-5)] {
            assert!(matches!(
                apply_command(&mut state, &Command::SetAmount(bad)),
                Err(CommandError::InvalidAmount(_))
            ));
            assert!(matches!(
                apply_command(&mut state, &Command::SetBudget(bad)),
                Err(CommandError::InvalidAmount(_))
            ));
        }
        assert_eq!(state, BotState::default());
    }

    #[test]
    fn setcoin_uppercases_and_resets_reference() {
        let mut state = BotState::default();
        state.reference_price = Some(dec!(100));
        let reply = apply_command(&mut state, &Command::SetCoin("ethusdt".into())).unwrap();
        assert!(reply.mutated);
        assert_eq!(state.params.symbol, "ETHUSDT");
        assert_eq!(state.reference_price, None);
    }

    #[test]
    fn setcoin_is_rejected_while_a_position_is_open() {
        let mut state = BotState::default();
        open_position(&mut state);
        let err = apply_command(&mut state, &Command::SetCoin("ETHUSDT".into())).unwrap_err();
        assert!(matches!(err, CommandError::PositionOpen(_)));
        assert_eq!(state.params.symbol, "BTCUSDT");
    }

    #[test]
    fn set_budget_resets_remaining() {
        let mut state = BotState::default();
        state.ledger.debit(dec!(100));
        apply_command(&mut state, &Command::SetBudget(dec!(1000))).unwrap();
        assert_eq!(state.ledger.allocated(), dec!(1000));
        assert_eq!(state.ledger.remaining(), dec!(1000));
        assert_eq!(state.params.allocated_budget, dec!(1000));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut state = BotState::default();
        assert!(apply_command(&mut state, &Command::Start).unwrap().mutated);
        assert!(state.running);
        assert!(!apply_command(&mut state, &Command::Start).unwrap().mutated);
        assert!(apply_command(&mut state, &Command::Stop).unwrap().mutated);
        assert!(!state.running);
        assert!(!apply_command(&mut state, &Command::Stop).unwrap().mutated);
    }

    #[test]
    fn status_does_not_mutate() {
        let mut state = BotState::default();
        state.reference_price = Some(dec!(123.4));
        let before = state.clone();
        let reply = apply_command(&mut state, &Command::Status).unwrap();
        assert!(!reply.mutated);
        assert!(reply.text.contains("BTCUSDT"));
        assert!(reply.text.contains("123.4"));
        assert_eq!(state, before);
    }

    #[test]
    fn reset_restores_defaults_and_warns_about_discarded_position() {
        let mut state = BotState::default();
        state.running = true;
        state.ledger.debit(dec!(50));
        open_position(&mut state);
        let reply = apply_command(&mut state, &Command::Reset).unwrap();
        assert!(reply.mutated);
        assert!(reply.text.contains("discarded"));
        assert_eq!(state, BotState::default());
    }
}
