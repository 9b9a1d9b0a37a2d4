// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Neighbour sets for coordination fan-out.
//!
//! Positions are taken from spawn order, so a topology is stable while its
//! members live and re-forms around gaps when agents leave.

use aegis_core::domain::node_config::Topology;
use aegis_core::AgentId;

/// Neighbours of `agent` among `members` (in spawn order). Empty when the
/// agent is not a member.
pub fn neighbors(topology: Topology, members: &[AgentId], agent: &AgentId) -> Vec<AgentId> {
    let Some(position) = members.iter().position(|member| member == agent) else {
        return Vec::new();
    };
    let count = members.len();

    let positions: Vec<usize> = match topology {
        Topology::Mesh => (0..count).filter(|&i| i != position).collect(),
        Topology::Star if position == 0 => (1..count).collect(),
        Topology::Star => vec![0],
        Topology::Ring if count <= 1 => Vec::new(),
        Topology::Ring => {
            let previous = (position + count - 1) % count;
            let next = (position + 1) % count;
            if previous == next {
                vec![next]
            } else {
                vec![previous, next]
            }
        }
        Topology::Hierarchical { fan_out } => {
            let fan_out = fan_out.max(1);
            let parent = (position > 0).then(|| (position - 1) / fan_out);
            let first_child = position * fan_out + 1;
            let children = first_child..(first_child + fan_out).min(count);
            parent.into_iter().chain(children).collect()
        }
    };

    positions.into_iter().map(|i| members[i]).collect()
}
