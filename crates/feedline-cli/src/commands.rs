use anyhow::{anyhow, bail, Context};
use feedline_client::{ClientEvent, FeedClient, FeedPost, ProfileEdit, Session, ThreadComment};
use feedline_shared::display::display_name;
use feedline_shared::models::{Post, Profile};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cli::{Cli, Command, EditArgs, ProfileCommand};

pub async fn run(client: &FeedClient, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Signup => {
            let (email, password) = credentials(cli)?;
            let session = client.session.sign_up(email, password).await?;
            provision(client, &session).await;
            println!("Signed up as {} ({})", email, session.user_id());
        }
        Command::Login => {
            let session = sign_in(client, cli).await?;
            let name = display_name(session.profile.as_ref(), Some(&session.user_id()));
            println!("Signed in as {name} ({})", session.user_id());
        }
        Command::Feed => {
            sign_in_if_possible(client, cli).await?;
            let posts = client.feed.refresh_feed().await;
            if posts.is_empty() {
                println!("No posts yet.");
            }
            for post in &posts {
                print_feed_post(post);
            }
        }
        Command::Like { post_id } => {
            sign_in(client, cli).await?;
            client.feed.refresh_feed().await;
            let before = client
                .feed
                .post(*post_id)
                .await
                .ok_or_else(|| anyhow!("post {post_id} is not in the feed"))?;
            client.feed.toggle_like(*post_id, before.is_liked).await;
            if let Some(after) = client.feed.post(*post_id).await {
                print_feed_post(&after);
            }
        }
        Command::Thread { post_id } => {
            sign_in_if_possible(client, cli).await?;
            let comments = client.thread.open(*post_id).await;
            print_thread(&comments);
        }
        Command::Comment { post_id, text } => {
            sign_in(client, cli).await?;
            client.feed.refresh_feed().await;
            client.thread.open(*post_id).await;
            client.thread.post_comment(text).await?;
            print_thread(&client.thread.comments().await);
        }
        Command::Post { text, image } => {
            sign_in(client, cli).await?;
            let post = client.composer.create_post(text, image.as_deref()).await?;
            println!("Posted {}", post.id);
        }
        Command::Delete { post_id } => {
            sign_in(client, cli).await?;
            if !client.profiles.delete_post(*post_id).await? {
                bail!("you have no post {post_id}");
            }
            println!("Deleted {post_id}");
        }
        Command::Profile(ProfileCommand::Show { user_id }) => {
            let target = match user_id {
                Some(id) => *id,
                None => sign_in(client, cli).await?.user_id(),
            };
            let profile = client.profiles.get_or_create(target).await;
            let posts = client.profiles.posts_by_user(target).await;
            print_profile(&profile, &posts);
        }
        Command::Profile(ProfileCommand::Edit(args)) => {
            let me = sign_in(client, cli).await?.user_id();
            let current = client.profiles.get_or_create(me).await;
            client
                .profiles
                .save_profile_edit(me, edit_from(args, &current))
                .await?;

            let profile = client.profiles.get_or_create(me).await;
            let posts = client.profiles.posts_by_user(me).await;
            print_profile(&profile, &posts);
        }
        Command::Watch => watch(client, cli).await?,
    }
    Ok(())
}

async fn watch(client: &FeedClient, cli: &Cli) -> anyhow::Result<()> {
    let session = sign_in_if_possible(client, cli).await?;
    let mut events = client.events.subscribe();

    client.start().await?;
    if let Some(session) = &session {
        client.profiles.watch_user(session.user_id()).await?;
    }
    client.feed.refresh_feed().await;
    eprintln!("Watching for changes, Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => print_event(client, &event).await?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn print_event(client: &FeedClient, event: &ClientEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    if let ClientEvent::FeedUpdated = event {
        if let Some(newest) = client.feed.posts().await.first() {
            print_feed_post(newest);
        }
    }
    Ok(())
}

fn credentials(cli: &Cli) -> anyhow::Result<(&str, &str)> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => bail!("--email and --password (or FEEDLINE_EMAIL and FEEDLINE_PASSWORD) are required"),
    }
}

async fn sign_in(client: &FeedClient, cli: &Cli) -> anyhow::Result<Session> {
    let (email, password) = credentials(cli)?;
    let session = client
        .session
        .sign_in(email, password)
        .await
        .with_context(|| format!("signing in as {email}"))?;
    provision(client, &session).await;
    Ok(client.session.current().unwrap_or(session))
}

/// Sign in only when credentials were given; browsing works signed out.
async fn sign_in_if_possible(client: &FeedClient, cli: &Cli) -> anyhow::Result<Option<Session>> {
    if cli.email.is_some() && cli.password.is_some() {
        sign_in(client, cli).await.map(Some)
    } else {
        Ok(None)
    }
}

async fn provision(client: &FeedClient, session: &Session) {
    if let Some(profile) = client.profiles.ensure_profile(&session.user).await {
        client.session.set_profile(profile);
    }
}

/// Flags left out keep the profile's current values.
fn edit_from(args: &EditArgs, current: &Profile) -> ProfileEdit {
    ProfileEdit {
        full_name: args
            .full_name
            .clone()
            .or_else(|| current.full_name.clone())
            .unwrap_or_default(),
        bio: args
            .bio
            .clone()
            .or_else(|| current.bio.clone())
            .unwrap_or_default(),
        dark_mode: args.dark_mode.unwrap_or(current.dark_mode),
        new_avatar: args.avatar.clone(),
        new_cover: args.cover.clone(),
    }
}

fn print_feed_post(post: &FeedPost) {
    let liked = if post.is_liked { " (liked)" } else { "" };
    println!(
        "{}  {}  {}",
        post.id(),
        post.author_name,
        post.post.created_at.format("%Y-%m-%d %H:%M")
    );
    if !post.post.text.is_empty() {
        println!("    {}", post.post.text);
    }
    if let Some(image) = &post.post.image_url {
        println!("    [image] {image}");
    }
    println!(
        "    likes: {}{liked}  comments: {}",
        post.likes_count, post.comments_count
    );
}

fn print_thread(comments: &[ThreadComment]) {
    if comments.is_empty() {
        println!("No comments yet.");
    }
    for c in comments {
        println!(
            "{}  {}: {}",
            c.comment.created_at.format("%Y-%m-%d %H:%M"),
            c.username,
            c.comment.text
        );
    }
}

fn print_profile(profile: &Profile, posts: &[Post]) {
    println!("{}", display_name(Some(profile), Some(&profile.id)));
    if let Some(username) = &profile.username {
        println!("  @{username}");
    }
    if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
        println!("  {bio}");
    }
    for (label, url) in [("avatar", &profile.avatar_url), ("cover", &profile.cover_url)] {
        if let Some(url) = url {
            println!("  {label}: {url}");
        }
    }
    println!("  dark mode: {}", if profile.dark_mode { "on" } else { "off" });
    println!("  {} post(s)", posts.len());
    for post in posts {
        println!("  {}  {}", post.id, post.text);
    }
}
