//! Frames the login front-end sends to clients.

use crate::core::packet::Packet;
use crate::protocol::opcode::SendOp;
use crate::protocol::session::SecondaryPassword;
use crate::storage::{AccountRow, CharacterId, CharacterRow};
use std::net::Ipv4Addr;

/// Failure codes carried by login result frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginFailure {
    Blocked = 3,
    WrongPassword = 4,
    NotRegistered = 5,
    ServerUnavailable = 6,
    AlreadyLoggedIn = 7,
    TooManyConnections = 10,
}

impl LoginFailure {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

pub const SERVER_UNAVAILABLE_NOTICE: &str = "Server is unavailable.";

/// Everything a client needs to reconnect to its channel. Single use; the
/// server keeps no copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationTicket {
    pub address: Ipv4Addr,
    pub port: u16,
    pub character_id: CharacterId,
    pub auth_code: u8,
    pub argument: u32,
}

impl MigrationTicket {
    pub fn issue(address: Ipv4Addr, port: u16, character_id: CharacterId) -> Self {
        Self {
            address,
            port,
            character_id,
            auth_code: rand::random(),
            argument: rand::random(),
        }
    }
}

pub fn check_password_failure(failure: LoginFailure) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::CheckPasswordResult.code());
    packet.write(failure.code()).write(0u8).write(0u32);
    packet
}

pub fn check_password_success(account: &AccountRow, secondary_password: &SecondaryPassword) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::CheckPasswordResult.code());
    packet
        .write(0u8)
        .write(0u8)
        .write(0u32)
        .write(account.id)
        .write_string(&account.username)
        .write(secondary_password.code());
    packet
}

/// Character roster for the selected world. The ranking block is only
/// present when `ranking` is set.
pub fn select_world_result(
    characters: &[CharacterRow],
    secondary_password: &SecondaryPassword,
    ranking: bool,
) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::SelectWorldResult.code());
    packet.write(0u8).write(characters.len().min(u8::MAX as usize) as u8);

    for character in characters.iter().take(u8::MAX as usize) {
        packet
            .write(character.id)
            .write_string(&character.name)
            .write(character.level)
            .write(character.job)
            .write(character.field_id)
            .write(character.portal);

        packet.write_bool(ranking);
        if ranking {
            // world rank, rank move, job rank, job rank move
            packet.write_zeroes(16);
        }
    }

    packet.write(secondary_password.code());
    packet
}

pub fn select_character_failure(failure: LoginFailure) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::SelectCharacterResult.code());
    packet.write(failure.code()).write(0u8);
    packet
}

pub fn select_character_success(ticket: &MigrationTicket) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::SelectCharacterResult.code());
    packet
        .write(0u8)
        .write(0u8)
        .write_ipv4(ticket.address)
        .write(ticket.port)
        .write(ticket.character_id)
        .write(ticket.auth_code)
        .write(ticket.argument);
    packet
}

/// Popup notice
pub fn broadcast_notice(message: &str) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::BroadcastMsg.code());
    packet.write(1u8).write_string(message);
    packet
}
