use super::schema::{AssistantContent, ClaudeRecord, UserContent};
use chrono::{DateTime, Duration, Utc};
use chronicle_types::{
    Diagnostics, Message, ParsedSession, RelationshipType, Role, Session, ToolCall, ToolCategory,
};
use std::collections::HashMap;

const FORK_THRESHOLD: usize = 3;

fn fork_gap() -> Duration {
    Duration::minutes(10)
}

struct Node {
    record: ClaudeRecord,
    uuid: String,
    parent_uuid: Option<String>,
    session_id: String,
    timestamp: DateTime<Utc>,
    is_sidechain: bool,
    subagent_type: Option<String>,
}

fn common_fields(record: &ClaudeRecord) -> Option<(String, Option<String>, String, String, bool, Option<String>)> {
    match record {
        ClaudeRecord::User(r) => Some((
            r.uuid.clone(),
            r.parent_uuid.clone(),
            r.session_id.clone(),
            r.timestamp.clone(),
            r.is_sidechain,
            r.subagent_type.clone(),
        )),
        ClaudeRecord::Assistant(r) => Some((
            r.uuid.clone(),
            r.parent_uuid.clone(),
            r.session_id.clone(),
            r.timestamp.clone(),
            r.is_sidechain,
            r.subagent_type.clone(),
        )),
        ClaudeRecord::System(r) => Some((
            r.uuid.clone(),
            r.parent_uuid.clone(),
            r.session_id.clone(),
            r.timestamp.clone(),
            r.is_sidechain,
            None,
        )),
        ClaudeRecord::Unknown => None,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| unix_epoch())
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).expect("unix epoch is a representable timestamp")
}

/// The reassembled DAG plus the computed adjacency needed to walk it. Kept
/// as a flat arena of indices rather than owned child pointers, so the walk
/// never has to fight the borrow checker over shared parent/child ownership.
struct Graph {
    nodes: Vec<Node>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    subtree_size: Vec<u32>,
    subtree_latest_ts: Vec<DateTime<Utc>>,
}

fn build_graph(lines: Vec<String>, diagnostics: &mut Diagnostics) -> Graph {
    let mut nodes: Vec<Node> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for line in lines {
        let record: ClaudeRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(_) => {
                diagnostics.push("skipped malformed json line");
                continue;
            }
        };
        let Some((uuid, parent_uuid, session_id, ts, is_sidechain, subagent_type)) =
            common_fields(&record)
        else {
            continue;
        };
        if index_of.contains_key(&uuid) {
            diagnostics.push(format!("duplicate uuid {uuid}, keeping first occurrence"));
            continue;
        }
        let node = Node {
            record,
            uuid: uuid.clone(),
            parent_uuid,
            session_id,
            timestamp: parse_timestamp(&ts),
            is_sidechain,
            subagent_type,
        };
        index_of.insert(uuid, nodes.len());
        nodes.push(node);
    }

    let n = nodes.len();
    let mut resolved_parent: Vec<Option<usize>> = nodes
        .iter()
        .map(|node| {
            node.parent_uuid
                .as_ref()
                .and_then(|p| index_of.get(p).copied())
        })
        .collect();

    break_cycles(&mut resolved_parent);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, parent) in resolved_parent.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }
    for kids in children.iter_mut() {
        kids.sort_by(|&a, &b| nodes[a].uuid.cmp(&nodes[b].uuid));
    }
    roots.sort_by(|&a, &b| nodes[a].timestamp.cmp(&nodes[b].timestamp));

    let (subtree_size, subtree_latest_ts) = compute_subtree_stats(&nodes, &children, &roots);

    Graph {
        nodes,
        children,
        roots,
        subtree_size,
        subtree_latest_ts,
    }
}

/// Breaks any cycle in the parent pointer graph by nulling out the parent
/// link of whichever node closes the loop, so it becomes a new root instead.
fn break_cycles(resolved_parent: &mut [Option<usize>]) {
    let n = resolved_parent.len();
    let mut color = vec![0u8; n]; // 0 = white, 1 = in progress, 2 = done
    for start in 0..n {
        if color[start] != 0 {
            continue;
        }
        let mut path = vec![start];
        color[start] = 1;
        let mut cur = start;
        loop {
            match resolved_parent[cur] {
                Some(p) if color[p] == 0 => {
                    color[p] = 1;
                    path.push(p);
                    cur = p;
                }
                Some(p) if color[p] == 1 => {
                    resolved_parent[cur] = None;
                    break;
                }
                _ => break,
            }
        }
        for node in path {
            color[node] = 2;
        }
    }
}

/// Iterative post-order pass computing, for every node, the size of its
/// subtree (inclusive) and the latest timestamp among its descendants.
fn compute_subtree_stats(
    nodes: &[Node],
    children: &[Vec<usize>],
    roots: &[usize],
) -> (Vec<u32>, Vec<DateTime<Utc>>) {
    let n = nodes.len();
    let mut size = vec![1u32; n];
    let mut latest = nodes.iter().map(|n| n.timestamp).collect::<Vec<_>>();
    let mut post_order = Vec::with_capacity(n);
    let mut stack: Vec<(usize, usize)> = roots.iter().map(|&r| (r, 0)).collect();
    while let Some((node, child_idx)) = stack.pop() {
        if child_idx < children[node].len() {
            let child = children[node][child_idx];
            stack.push((node, child_idx + 1));
            stack.push((child, 0));
        } else {
            post_order.push(node);
        }
    }
    for &node in &post_order {
        for &child in &children[node] {
            size[node] += size[child];
            if latest[child] > latest[node] {
                latest[node] = latest[child];
            }
        }
    }
    (size, latest)
}

fn is_real_user_message(node: &Node) -> bool {
    matches!(&node.record, ClaudeRecord::User(r) if r.message.content.iter().any(|c| matches!(c, UserContent::Text { .. })))
}

struct Ctx<'a> {
    graph: &'a Graph,
}

impl<'a> Ctx<'a> {
    fn count_user_messages(&self, root: usize) -> usize {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            if is_real_user_message(&self.graph.nodes[n]) {
                count += 1;
            }
            stack.extend(self.graph.children[n].iter().copied());
        }
        count
    }

    fn choose_principal(&self, candidates: &[usize]) -> usize {
        *candidates
            .iter()
            .max_by(|&&a, &&b| {
                self.graph.subtree_size[a]
                    .cmp(&self.graph.subtree_size[b])
                    .then(self.graph.subtree_latest_ts[a].cmp(&self.graph.subtree_latest_ts[b]))
                    .then(self.graph.nodes[b].uuid.cmp(&self.graph.nodes[a].uuid))
            })
            .expect("candidates is non-empty")
    }
}

/// One thread through the DAG: a root plus the sessions it directly or
/// transitively spawned (forks and sub-agents), fully assembled.
#[allow(clippy::too_many_arguments)]
fn build_thread(
    ctx: &Ctx,
    root: usize,
    session_id: String,
    parent_session_id: Option<String>,
    relationship: Option<RelationshipType>,
    diagnostics: &mut Diagnostics,
    out: &mut Vec<ParsedSession>,
) {
    let graph = ctx.graph;
    let mut thread_nodes = Vec::new();
    let mut attachments: HashMap<usize, Vec<String>> = HashMap::new();
    let mut cur = root;

    loop {
        thread_nodes.push(cur);
        let kids = graph.children[cur].clone();
        let (sidechain_kids, normal_kids): (Vec<usize>, Vec<usize>) = kids
            .into_iter()
            .partition(|&c| graph.nodes[c].is_sidechain || graph.nodes[c].subagent_type.is_some());

        for sc_root in sidechain_kids {
            let sub_id = format!(
                "{session_id}:subagent:{}",
                crate::util::short_suffix(&graph.nodes[sc_root].uuid)
            );
            build_thread(
                ctx,
                sc_root,
                sub_id.clone(),
                Some(session_id.clone()),
                Some(RelationshipType::Subagent),
                diagnostics,
                out,
            );
            attachments.entry(cur).or_default().push(sub_id);
        }

        if normal_kids.is_empty() {
            break;
        }
        let principal = ctx.choose_principal(&normal_kids);
        for &k in &normal_kids {
            if k == principal {
                continue;
            }
            let gap = graph.nodes[k].timestamp - graph.nodes[cur].timestamp;
            let user_count = ctx.count_user_messages(k);
            if gap >= fork_gap() && user_count >= FORK_THRESHOLD {
                let fork_id = format!(
                    "{session_id}:fork:{}",
                    crate::util::short_suffix(&graph.nodes[k].uuid)
                );
                build_thread(
                    ctx,
                    k,
                    fork_id,
                    Some(session_id.clone()),
                    Some(RelationshipType::Fork),
                    diagnostics,
                    out,
                );
            } else {
                diagnostics.push(format!(
                    "discarded fork candidate at {}: below emission threshold",
                    graph.nodes[k].uuid
                ));
            }
        }
        cur = principal;
    }

    let parsed = assemble(
        graph,
        &session_id,
        parent_session_id,
        relationship,
        &thread_nodes,
        &attachments,
    );
    out.push(parsed);
}

fn assemble(
    graph: &Graph,
    session_id: &str,
    parent_session_id: Option<String>,
    relationship: Option<RelationshipType>,
    thread_nodes: &[usize],
    attachments: &HashMap<usize, Vec<String>>,
) -> ParsedSession {
    let mut messages = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_use_index: HashMap<String, usize> = HashMap::new();
    let mut ordinal: u32 = 0;
    let mut first_message: Option<String> = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut ended_at: Option<DateTime<Utc>> = None;
    let mut project = String::from("unknown");

    for &idx in thread_nodes {
        let node = &graph.nodes[idx];
        if let ClaudeRecord::User(r) = &node.record
            && let Some(cwd) = &r.cwd
        {
            project = crate::util::project_from_cwd(cwd);
        }
        if started_at.is_none() {
            started_at = Some(node.timestamp);
        }
        ended_at = Some(node.timestamp);

        match &node.record {
            ClaudeRecord::User(r) => {
                for content in &r.message.content {
                    match content {
                        UserContent::Text { text } => {
                            if first_message.is_none() {
                                first_message = Some(text.clone());
                            }
                            let mut message =
                                Message::new(session_id, ordinal, Role::User, text.clone());
                            message.timestamp = Some(node.timestamp);
                            ordinal += 1;
                            messages.push(message);
                        }
                        UserContent::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            let result_len = content
                                .as_ref()
                                .and_then(|v| v.as_str())
                                .map(|s| s.len() as u32)
                                .unwrap_or(0);
                            if let Some(&tc_idx) = tool_use_index.get(tool_use_id) {
                                let tc: &mut ToolCall = &mut tool_calls[tc_idx];
                                tc.result_content_length = Some(result_len);
                            }
                            let summary = if *is_error {
                                format!("[tool error, {result_len} bytes]")
                            } else {
                                format!("[tool result, {result_len} bytes]")
                            };
                            let mut message =
                                Message::new(session_id, ordinal, Role::Tool, summary);
                            message.timestamp = Some(node.timestamp);
                            ordinal += 1;
                            messages.push(message);
                        }
                        UserContent::Unknown => {}
                    }
                }
            }
            ClaudeRecord::Assistant(r) => {
                let mut text_parts = Vec::new();
                let mut has_thinking = false;
                let mut tool_uses: Vec<(&str, &str, &serde_json::Value)> = Vec::new();
                for content in &r.message.content {
                    match content {
                        AssistantContent::Text { text } => text_parts.push(text.as_str()),
                        AssistantContent::Thinking { .. } => has_thinking = true,
                        AssistantContent::ToolUse { id, name, input } => {
                            tool_uses.push((id, name, input))
                        }
                        AssistantContent::Unknown => {}
                    }
                }
                let content = text_parts.join("\n");
                let mut message = Message::new(session_id, ordinal, Role::Assistant, content);
                message.timestamp = Some(node.timestamp);
                message.has_thinking = has_thinking;
                message.has_tool_use = !tool_uses.is_empty();
                let message_ordinal = ordinal;
                ordinal += 1;

                let mut pending_subagents = attachments.get(&idx).cloned().unwrap_or_default();
                pending_subagents.reverse();

                for (tool_use_id, name, input) in tool_uses {
                    let category = ToolCategory::classify(name);
                    let subagent_session_id =
                        if name == "Task" { pending_subagents.pop() } else { None };
                    let tool_call = ToolCall {
                        session_id: session_id.to_string(),
                        message_ordinal,
                        tool_name: name.to_string(),
                        category,
                        tool_use_id: Some(tool_use_id.to_string()),
                        input_json: Some(input.to_string()),
                        skill_name: if category == ToolCategory::Skill {
                            input.get("skill").and_then(|v| v.as_str()).map(String::from)
                        } else {
                            None
                        },
                        result_content_length: None,
                        subagent_session_id,
                    };
                    tool_use_index.insert(tool_use_id.to_string(), tool_calls.len());
                    tool_calls.push(tool_call);
                }
                messages.push(message);
            }
            ClaudeRecord::System(_) | ClaudeRecord::Unknown => {}
        }
    }

    let session = Session {
        id: session_id.to_string(),
        project,
        machine: String::new(),
        agent: "claude".to_string(),
        first_message,
        started_at,
        ended_at,
        message_count: messages.len() as u32,
        parent_session_id,
        relationship_type: relationship,
        provenance: None,
        created_at: Utc::now(),
    };

    ParsedSession {
        session,
        messages,
        tool_calls,
    }
}

/// Reconstructs one or more sessions from the lines of a single Claude
/// transcript file. Forks and sub-agent spawns are split out as their own
/// `ParsedSession`s, linked back to `session_id` (or each other, for nested
/// splits) via `parent_session_id`.
pub(crate) fn build(
    lines: Vec<String>,
    diagnostics: &mut Diagnostics,
) -> Vec<ParsedSession> {
    let graph = build_graph(lines, diagnostics);
    if graph.nodes.is_empty() {
        return Vec::new();
    }
    let ctx = Ctx { graph: &graph };
    let mut out = Vec::new();
    for &root in &graph.roots.clone() {
        let root_session_id = format!("claude:{}", graph.nodes[root].session_id);
        build_thread(&ctx, root, root_session_id, None, None, diagnostics, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(uuid: &str, parent: Option<&str>, ts: &str, text: &str) -> String {
        format!(
            r#"{{"type":"user","uuid":"{uuid}","parentUuid":{},"sessionId":"s1","timestamp":"{ts}","message":{{"content":[{{"type":"text","text":"{text}"}}]}}}}"#,
            parent.map(|p| format!("\"{p}\"")).unwrap_or_else(|| "null".into())
        )
    }

    #[test]
    fn single_user_turn() {
        let lines = vec![line("u1", None, "2024-06-01T10:00:00Z", "hi")];
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.message_count, 1);
        assert_eq!(sessions[0].messages[0].ordinal, 0);
        assert_eq!(sessions[0].messages[0].content, "hi");
    }

    #[test]
    fn empty_input_yields_no_sessions() {
        let mut diagnostics = Diagnostics::default();
        let sessions = build(Vec::new(), &mut diagnostics);
        assert!(sessions.is_empty());
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut lines = vec!["not json".to_string()];
        lines.push(line("u1", None, "2024-06-01T10:00:00Z", "hi"));
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 1);
        assert!(!diagnostics.notes.is_empty());
    }

    #[test]
    fn ignored_fork_below_threshold_stays_single_session() {
        let mut lines = vec![line("u1", None, "2024-06-01T10:00:00Z", "start")];
        lines.push(line("u2", Some("u1"), "2024-06-01T10:01:00Z", "continue a"));
        lines.push(line("u2b", Some("u1"), "2024-06-01T10:20:00Z", "continue b"));
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn fork_above_threshold_is_emitted() {
        let mut lines = vec![line("root", None, "2024-06-01T10:00:00Z", "start")];
        // principal branch: 1 extra message after root
        lines.push(line("p1", Some("root"), "2024-06-01T10:01:00Z", "principal"));
        // fork branch starting 15 minutes later with 3 user messages
        lines.push(line("f1", Some("root"), "2024-06-01T10:20:00Z", "fork msg 1"));
        lines.push(line("f2", Some("f1"), "2024-06-01T10:21:00Z", "fork msg 2"));
        lines.push(line("f3", Some("f2"), "2024-06-01T10:22:00Z", "fork msg 3"));
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 2);
        let fork = sessions.iter().find(|s| s.session.id.contains(":fork:")).unwrap();
        assert_eq!(fork.session.relationship_type, Some(RelationshipType::Fork));
        assert!(fork.session.parent_session_id.is_some());
    }

    #[test]
    fn orphan_parent_becomes_new_root() {
        let lines = vec![line("child", Some("missing-parent"), "2024-06-01T10:00:00Z", "hi")];
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn self_referencing_parent_does_not_hang() {
        let lines = vec![line("a", Some("a"), "2024-06-01T10:00:00Z", "hi")];
        let mut diagnostics = Diagnostics::default();
        let sessions = build(lines, &mut diagnostics);
        assert_eq!(sessions.len(), 1);
    }
}
